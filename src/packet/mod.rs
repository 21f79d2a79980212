//! Packet-related types.
//!
//! OpenPGP data is a sequence of packets: a one-octet content tag
//! burst, a length, and a body.  See [Section 4 of RFC 4880] for
//! details.
//!
//!   [Section 4 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-4

use std::fmt;
use std::io::{self, Read};

use crate::Error;
use crate::Result;

pub mod compressed_data;
pub use self::compressed_data::CompressedData;
pub mod literal;
pub use self::literal::Literal;
pub mod one_pass_sig;
pub use self::one_pass_sig::OnePassSig;
pub mod pkesk;
pub use self::pkesk::PKESK;
pub mod seip;
pub use self::seip::SEIP;
pub mod signature;
pub use self::signature::Signature;

/// The OpenPGP packet tags as defined in [Section 4.3 of RFC 4880].
///
///   [Section 4.3 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-4.3
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Reserved packet tag.
    Reserved,
    /// Public-Key Encrypted Session Key packet.
    PKESK,
    /// Signature packet.
    Signature,
    /// Symmetric-Key Encrypted Session Key packet.
    SKESK,
    /// One-Pass Signature packet.
    OnePassSig,
    /// Secret-Key packet.
    SecretKey,
    /// Public-Key packet.
    PublicKey,
    /// Secret-Subkey packet.
    SecretSubkey,
    /// Compressed Data packet.
    CompressedData,
    /// Symmetrically Encrypted Data packet, without integrity
    /// protection.
    SED,
    /// Marker packet.
    Marker,
    /// Literal Data packet.
    Literal,
    /// Trust packet.
    Trust,
    /// User ID packet.
    UserID,
    /// Public-Subkey packet.
    PublicSubkey,
    /// User Attribute packet.
    UserAttribute,
    /// Symmetrically Encrypted and Integrity Protected Data packet.
    SEIP,
    /// Modification Detection Code packet.
    MDC,
    /// Unknown packet tag.
    Unknown(u8),
}

impl From<u8> for Tag {
    fn from(u: u8) -> Self {
        use self::Tag::*;
        match u {
            0 => Reserved,
            1 => PKESK,
            2 => Signature,
            3 => SKESK,
            4 => OnePassSig,
            5 => SecretKey,
            6 => PublicKey,
            7 => SecretSubkey,
            8 => CompressedData,
            9 => SED,
            10 => Marker,
            11 => Literal,
            12 => Trust,
            13 => UserID,
            14 => PublicSubkey,
            17 => UserAttribute,
            18 => SEIP,
            19 => MDC,
            u => Unknown(u),
        }
    }
}

impl From<Tag> for u8 {
    fn from(t: Tag) -> u8 {
        use self::Tag::*;
        match t {
            Reserved => 0,
            PKESK => 1,
            Signature => 2,
            SKESK => 3,
            OnePassSig => 4,
            SecretKey => 5,
            PublicKey => 6,
            SecretSubkey => 7,
            CompressedData => 8,
            SED => 9,
            Marker => 10,
            Literal => 11,
            Trust => 12,
            UserID => 13,
            PublicSubkey => 14,
            UserAttribute => 17,
            SEIP => 18,
            MDC => 19,
            Unknown(u) => u,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The length of a packet body.
///
/// See [Section 4.2 of RFC 4880].
///
///   [Section 4.2 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-4.2
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyLength {
    /// A known-length body.
    Full(u32),
    /// The first chunk of a partial-length body; only the chunk's
    /// length is known.
    Partial(u32),
    /// The body extends to the end of the enclosing stream
    /// (old-format indeterminate length).
    Indeterminate,
}

fn read_octet<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut b = [0u8; 1];
    reader.read_exact(&mut b)?;
    Ok(b[0])
}

impl BodyLength {
    /// Parses a new-format body length.
    pub(crate) fn parse_new_format<R: Read>(reader: &mut R)
        -> io::Result<BodyLength>
    {
        let octet1 = read_octet(reader)?;
        match octet1 {
            0..=191 =>
                Ok(BodyLength::Full(octet1 as u32)),
            192..=223 => {
                let octet2 = read_octet(reader)?;
                Ok(BodyLength::Full(
                    ((octet1 as u32 - 192) << 8) + octet2 as u32 + 192))
            }
            224..=254 =>
                Ok(BodyLength::Partial(1 << (octet1 & 0x1f))),
            255 => {
                let mut length = [0u8; 4];
                reader.read_exact(&mut length)?;
                Ok(BodyLength::Full(u32::from_be_bytes(length)))
            }
        }
    }

    /// Parses an old-format body length.
    pub(crate) fn parse_old_format<R: Read>(reader: &mut R, length_type: u8)
        -> io::Result<BodyLength>
    {
        match length_type {
            0 => Ok(BodyLength::Full(read_octet(reader)? as u32)),
            1 => {
                let mut length = [0u8; 2];
                reader.read_exact(&mut length)?;
                Ok(BodyLength::Full(u16::from_be_bytes(length) as u32))
            }
            2 => {
                let mut length = [0u8; 4];
                reader.read_exact(&mut length)?;
                Ok(BodyLength::Full(u32::from_be_bytes(length)))
            }
            3 => Ok(BodyLength::Indeterminate),
            _ => unreachable!("two-bit field"),
        }
    }
}

/// A packet header: the content tag and the body length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// The packet's tag.
    pub tag: Tag,
    /// The length of the packet's body.
    pub length: BodyLength,
}

impl Header {
    /// Parses a packet header whose CTB octet has already been read.
    pub(crate) fn parse<R: Read>(ctb: u8, reader: &mut R) -> Result<Header> {
        if ctb & 0x80 == 0 {
            return Err(Error::MalformedPacket(
                format!("Invalid CTB 0x{:02x}: bit 7 must be set", ctb))
                .into());
        }

        if ctb & 0x40 != 0 {
            // New format.
            Ok(Header {
                tag: Tag::from(ctb & 0x3f),
                length: BodyLength::parse_new_format(reader)?,
            })
        } else {
            // Old format.
            Ok(Header {
                tag: Tag::from((ctb >> 2) & 0xf),
                length: BodyLength::parse_old_format(reader, ctb & 0x3)?,
            })
        }
    }
}

/// A fully parsed non-container packet.
///
/// Container packets (compressed data, encrypted data, literal data)
/// never appear here: their bodies are handed over as streams by the
/// packet reader instead of being buffered.
#[derive(Clone, Debug)]
pub enum Packet {
    /// A public-key encrypted session key.
    PKESK(PKESK),
    /// A one-pass signature.
    OnePassSig(OnePassSig),
    /// A (trailing) signature.
    Signature(Signature),
}

impl Packet {
    /// Returns the packet's tag.
    pub fn tag(&self) -> Tag {
        match self {
            Packet::PKESK(_) => Tag::PKESK,
            Packet::OnePassSig(_) => Tag::OnePassSig,
            Packet::Signature(_) => Tag::Signature,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse_new(bytes: &[u8]) -> BodyLength {
        BodyLength::parse_new_format(&mut &bytes[..]).unwrap()
    }

    #[test]
    fn new_format_lengths() {
        assert_eq!(parse_new(&[0]), BodyLength::Full(0));
        assert_eq!(parse_new(&[100]), BodyLength::Full(100));
        assert_eq!(parse_new(&[191]), BodyLength::Full(191));
        assert_eq!(parse_new(&[192, 0]), BodyLength::Full(192));
        assert_eq!(parse_new(&[193, 22]), BodyLength::Full(470));
        assert_eq!(parse_new(&[223, 255]), BodyLength::Full(8383));
        assert_eq!(parse_new(&[224]), BodyLength::Partial(1));
        assert_eq!(parse_new(&[233]), BodyLength::Partial(512));
        assert_eq!(parse_new(&[254]), BodyLength::Partial(1 << 30));
        assert_eq!(parse_new(&[255, 0, 0, 2, 0]), BodyLength::Full(512));

        // Truncated multi-octet length.
        assert!(BodyLength::parse_new_format(&mut &[192][..]).is_err());
    }

    #[test]
    fn old_format_lengths() {
        assert_eq!(
            BodyLength::parse_old_format(&mut &[42][..], 0).unwrap(),
            BodyLength::Full(42));
        assert_eq!(
            BodyLength::parse_old_format(&mut &[1, 2][..], 1).unwrap(),
            BodyLength::Full(258));
        assert_eq!(
            BodyLength::parse_old_format(&mut &[0, 1, 0, 0][..], 2).unwrap(),
            BodyLength::Full(65536));
        assert_eq!(
            BodyLength::parse_old_format(&mut &[][..], 3).unwrap(),
            BodyLength::Indeterminate);
    }

    #[test]
    fn headers() {
        // New-format literal data packet, one-octet length.
        let h = Header::parse(0xcb, &mut &[5][..]).unwrap();
        assert_eq!(h.tag, Tag::Literal);
        assert_eq!(h.length, BodyLength::Full(5));

        // Old-format PKESK, two-octet length.
        let h = Header::parse(0x85, &mut &[1, 0][..]).unwrap();
        assert_eq!(h.tag, Tag::PKESK);
        assert_eq!(h.length, BodyLength::Full(256));

        // Bit 7 clear: not a packet.
        assert!(Header::parse(0x2a, &mut &[][..]).is_err());
    }
}
