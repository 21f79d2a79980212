//! Packet parsing.
//!
//! [`PacketReader`] walks a byte stream packet by packet.  Small
//! packets (session keys, one-pass signatures, signatures) are parsed
//! into values; container packets (encrypted data, compressed data,
//! literal data) are handed over as bounded streams so that
//! arbitrarily large messages are processed in constant space.
//!
//! Every byte source in the parsing stack implements [`Source`]:
//! `io::Read` plus a `finish` operation that drains the layer,
//! verifies any trailing integrity state it owns (modification
//! detection codes, armor checksums), and finishes the layer below.

use std::io::{self, Read};

use crate::armor;
use crate::packet::{
    BodyLength,
    CompressedData,
    Header,
    Literal,
    OnePassSig,
    Packet,
    PKESK,
    Signature,
    SEIP,
    Tag,
};
use crate::types::CompressionAlgorithm;
use crate::Error;
use crate::Result;

pub mod stream;

/// How deeply container packets may nest.
///
/// Bounds the transform stack independently of the input and defends
/// against decompression bombs.
pub(crate) const MAX_NESTING_DEPTH: usize = 16;

/// The largest acceptable non-container packet.
const SMALL_PACKET_CEILING: u64 = 1 << 20;

/// A layer in the parsing stack.
pub(crate) trait Source: Read {
    /// Drains this layer, verifies any trailing integrity state, and
    /// finishes the layer below.
    ///
    /// The outermost layer wraps the caller's stream and must neither
    /// drain nor close it.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// The caller-supplied stream at the bottom of the stack.
pub(crate) struct External<R: Read>(pub R);

impl<R: Read> Read for External<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> Source for External<R> {
    fn finish(self: Box<Self>) -> Result<()> {
        // Ownership of the stream stays with the caller; there is
        // nothing to verify and nothing of ours to drain.
        Ok(())
    }
}

impl<'a> Source for armor::Reader<'a> {
    fn finish(mut self: Box<Self>) -> Result<()> {
        // Drain the remaining radix-64 lines.  This consumes the
        // armor footer and verifies the CRC-24 checksum.
        let mut sink = io::sink();
        io::copy(&mut *self, &mut sink)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
enum BodyState {
    /// A length-bounded body.  `last` is false while partial-length
    /// chunks remain.
    Limited { remaining: u64, last: bool },
    /// An old-format indeterminate body: everything up to the end of
    /// the enclosing stream.
    ToEof,
}

/// The body of a single packet, as a stream.
///
/// Partial-length continuation headers are consumed transparently.
pub(crate) struct BodyReader<'a> {
    source: Box<dyn Source + 'a>,
    state: BodyState,
}

impl<'a> BodyReader<'a> {
    pub(crate) fn new(source: Box<dyn Source + 'a>, length: BodyLength)
        -> BodyReader<'a>
    {
        let state = match length {
            BodyLength::Full(n) =>
                BodyState::Limited { remaining: n as u64, last: true },
            BodyLength::Partial(n) =>
                BodyState::Limited { remaining: n as u64, last: false },
            BodyLength::Indeterminate => BodyState::ToEof,
        };
        BodyReader { source, state }
    }

    /// Returns the underlying source.
    ///
    /// Meaningful once the body has been read to its end: the source
    /// is then positioned at the packet that follows this one.
    pub(crate) fn into_inner(self) -> Box<dyn Source + 'a> {
        self.source
    }

    /// Skips whatever is left of the body.
    ///
    /// The source is returned even if draining fails, so that
    /// enclosing layers can still be finished.
    pub(crate) fn drain(mut self) -> (Box<dyn Source + 'a>, Result<()>) {
        let mut sink = io::sink();
        let result = io::copy(&mut self, &mut sink)
            .map(|_| ())
            .map_err(|e| e.into());
        (self.source, result)
    }
}

impl<'a> Read for BodyReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match self.state {
                BodyState::ToEof => return self.source.read(buf),
                BodyState::Limited { remaining: 0, last: true } =>
                    return Ok(0),
                BodyState::Limited { remaining: 0, last: false } => {
                    // Chunk exhausted; consume the next length header.
                    self.state = match BodyLength::parse_new_format(
                        &mut self.source)?
                    {
                        BodyLength::Full(n) =>
                            BodyState::Limited { remaining: n as u64,
                                                 last: true },
                        BodyLength::Partial(n) =>
                            BodyState::Limited { remaining: n as u64,
                                                 last: false },
                        BodyLength::Indeterminate =>
                            return Err(io::Error::new(
                                io::ErrorKind::Other,
                                Error::MalformedPacket(
                                    "Invalid partial length continuation"
                                        .into()))),
                    };
                }
                BodyState::Limited { remaining, last } => {
                    let n =
                        std::cmp::min(buf.len() as u64, remaining) as usize;
                    let got = self.source.read(&mut buf[..n])?;
                    if got == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            Error::MalformedMessage(
                                "Packet body is truncated".into())));
                    }
                    self.state = BodyState::Limited {
                        remaining: remaining - got as u64,
                        last,
                    };
                    return Ok(got);
                }
            }
        }
    }
}

impl<'a> Source for BodyReader<'a> {
    fn finish(self: Box<Self>) -> Result<()> {
        let (source, result) = (*self).drain();
        result?;
        source.finish()
    }
}

/// Streaming decompression of a compressed data packet's body.
pub(crate) enum Decompressor<'a> {
    Stored(BodyReader<'a>),
    Zip(flate2::read::DeflateDecoder<BodyReader<'a>>),
    Zlib(flate2::read::ZlibDecoder<BodyReader<'a>>),
    BZip2(bzip2::read::BzDecoder<BodyReader<'a>>),
}

impl<'a> Decompressor<'a> {
    pub(crate) fn new(algo: CompressionAlgorithm, body: BodyReader<'a>)
        -> Result<Decompressor<'a>>
    {
        use crate::types::CompressionAlgorithm::*;
        match algo {
            Uncompressed => Ok(Decompressor::Stored(body)),
            Zip => Ok(Decompressor::Zip(
                flate2::read::DeflateDecoder::new(body))),
            Zlib => Ok(Decompressor::Zlib(
                flate2::read::ZlibDecoder::new(body))),
            BZip2 => Ok(Decompressor::BZip2(
                bzip2::read::BzDecoder::new(body))),
            algo => Err(Error::UnsupportedCompressionAlgorithm(algo).into()),
        }
    }
}

impl<'a> Read for Decompressor<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decompressor::Stored(r) => r.read(buf),
            Decompressor::Zip(r) => r.read(buf),
            Decompressor::Zlib(r) => r.read(buf),
            Decompressor::BZip2(r) => r.read(buf),
        }
    }
}

impl<'a> Source for Decompressor<'a> {
    fn finish(self: Box<Self>) -> Result<()> {
        // The compressed body is skipped as raw bytes; inner layers
        // see (and hash) exactly what is left on the wire.
        let body = match *self {
            Decompressor::Stored(r) => r,
            Decompressor::Zip(r) => r.into_inner(),
            Decompressor::Zlib(r) => r.into_inner(),
            Decompressor::BZip2(r) => r.into_inner(),
        };
        Box::new(body).finish()
    }
}

/// What [`PacketReader::next`] found.
pub(crate) enum Item<'a> {
    /// A fully parsed non-container packet.
    Packet(Packet),
    /// A container packet: its metadata and its body as a stream.
    Container(Container<'a>),
    /// The end of this packet sequence.
    Eof,
}

/// A container packet handed over as a stream.
pub(crate) enum Container<'a> {
    /// Encrypted data; the body starts after the version octet.
    Seip(SEIP, BodyReader<'a>),
    /// Compressed data; the body starts after the algorithm octet.
    Compressed(CompressedData, BodyReader<'a>),
    /// Literal data; the body is the payload, the metadata header
    /// having been consumed.
    Literal(Literal, BodyReader<'a>),
}

/// Sequentially parses the packets of one stream.
///
/// Packet kinds that play no role in message decoding (marker, trust,
/// key material in the wrong place, unknown tags) are skipped
/// transparently, for compatibility with packet types this crate does
/// not understand.
pub(crate) struct PacketReader<'a> {
    source: Option<Box<dyn Source + 'a>>,
}

/// Whether to trace execution by default (on stderr).
const TRACE: bool = false;

impl<'a> PacketReader<'a> {
    pub(crate) fn new(source: Box<dyn Source + 'a>) -> PacketReader<'a> {
        PacketReader { source: Some(source) }
    }

    /// Returns the underlying source.
    ///
    /// `None` if a container was handed over or a drain failed; the
    /// source then lives on in the container's body reader.
    pub(crate) fn into_source(self) -> Option<Box<dyn Source + 'a>> {
        self.source
    }

    /// Parses the next packet.
    pub(crate) fn next(&mut self) -> Result<Item<'a>> {
        tracer!(TRACE, "PacketReader::next");

        let mut source = self.source.take()
            .ok_or_else(|| Error::InvalidOperation(
                "Packet sequence already handed over".into()))?;

        loop {
            // Read the CTB, detecting the end of the sequence.
            let mut ctb = [0u8; 1];
            loop {
                match source.read(&mut ctb) {
                    Ok(0) => {
                        self.source = Some(source);
                        return Ok(Item::Eof);
                    }
                    Ok(_) => break,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted =>
                        continue,
                    Err(e) => {
                        self.source = Some(source);
                        return Err(e.into());
                    }
                }
            }

            let header = match Header::parse(ctb[0], &mut source) {
                Ok(header) => header,
                Err(e) => {
                    self.source = Some(source);
                    return Err(e);
                }
            };
            t!("Found a {} packet, length {:?}", header.tag, header.length);

            match header.tag {
                Tag::SEIP => {
                    let mut body = BodyReader::new(source, header.length);
                    let version = match read_octet(&mut body) {
                        Ok(v) => v,
                        Err(e) => {
                            self.source = Some(body.into_inner());
                            return Err(e);
                        }
                    };
                    if version != 1 {
                        self.source = Some(body.into_inner());
                        return Err(Error::MalformedPacket(
                            format!("SEIP version {} not supported",
                                    version)).into());
                    }
                    return Ok(Item::Container(
                        Container::Seip(SEIP { version }, body)));
                }

                Tag::CompressedData => {
                    let mut body = BodyReader::new(source, header.length);
                    let algo = match read_octet(&mut body) {
                        Ok(a) => CompressionAlgorithm::from(a),
                        Err(e) => {
                            self.source = Some(body.into_inner());
                            return Err(e);
                        }
                    };
                    return Ok(Item::Container(
                        Container::Compressed(CompressedData { algo }, body)));
                }

                Tag::Literal => {
                    let mut body = BodyReader::new(source, header.length);
                    let literal = match Literal::parse(&mut body) {
                        Ok(l) => l,
                        Err(e) => {
                            self.source = Some(body.into_inner());
                            return Err(e);
                        }
                    };
                    return Ok(Item::Container(
                        Container::Literal(literal, body)));
                }

                Tag::SED => {
                    self.source = Some(source);
                    return Err(Error::MalformedMessage(
                        "Encrypted data without integrity protection"
                            .into()).into());
                }

                Tag::PKESK | Tag::OnePassSig | Tag::Signature => {
                    let body =
                        match read_small_body(&mut source, header.length) {
                            Ok(body) => body,
                            Err(e) => {
                                self.source = Some(source);
                                return Err(e);
                            }
                        };
                    self.source = Some(source);
                    let packet = match header.tag {
                        Tag::PKESK =>
                            Packet::PKESK(PKESK::parse(&body)?),
                        Tag::OnePassSig =>
                            Packet::OnePassSig(OnePassSig::parse(&body)?),
                        Tag::Signature =>
                            Packet::Signature(Signature::parse(&body)?),
                        _ => unreachable!(),
                    };
                    return Ok(Item::Packet(packet));
                }

                tag => {
                    // Not part of message decoding.  Skip it.
                    t!("Skipping a {} packet", tag);
                    let (recovered, result) =
                        BodyReader::new(source, header.length).drain();
                    source = recovered;
                    if let Err(e) = result {
                        self.source = Some(source);
                        return Err(e);
                    }
                }
            }
        }
    }
}

fn read_octet<R: Read>(reader: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    reader.read_exact(&mut b)
        .map_err(|_| Error::MalformedPacket(
            "Truncated packet body".into()))?;
    Ok(b[0])
}

/// Reads a complete small-packet body, following partial-length
/// continuations.
fn read_small_body<'a>(source: &mut Box<dyn Source + 'a>,
                       length: BodyLength)
    -> Result<Vec<u8>>
{
    let mut body = Vec::new();
    let mut length = length;
    loop {
        let (chunk, last) = match length {
            BodyLength::Full(n) => (n as u64, true),
            BodyLength::Partial(n) => (n as u64, false),
            BodyLength::Indeterminate =>
                return Err(Error::MalformedPacket(
                    "Indeterminate length on a non-container packet"
                        .into()).into()),
        };

        if body.len() as u64 + chunk > SMALL_PACKET_CEILING {
            return Err(Error::MalformedPacket(
                format!("Packet exceeds {} bytes", SMALL_PACKET_CEILING))
                .into());
        }

        let start = body.len();
        body.resize(start + chunk as usize, 0);
        source.read_exact(&mut body[start..])
            .map_err(|_| Error::MalformedMessage(
                "Packet body is truncated".into()))?;

        if last {
            return Ok(body);
        }
        length = BodyLength::parse_new_format(source)?;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::DataFormat;

    fn reader(bytes: &[u8]) -> PacketReader {
        PacketReader::new(Box::new(External(bytes)))
    }

    /// A new-format literal data packet around `data`.
    fn literal_packet(data: &[u8]) -> Vec<u8> {
        let mut p = vec![0xcb];
        let body_len = 1 + 1 + 4 + data.len();
        assert!(body_len < 192);
        p.push(body_len as u8);
        p.extend_from_slice(&[b'b', 0, 0, 0, 0, 0]);
        p.extend_from_slice(data);
        p
    }

    #[test]
    fn literal_round_trip() {
        let packet = literal_packet(b"hello world");
        let mut r = reader(&packet);
        match r.next().unwrap() {
            Item::Container(Container::Literal(l, mut body)) => {
                assert_eq!(l.format, DataFormat::Binary);
                let mut data = Vec::new();
                body.read_to_end(&mut data).unwrap();
                assert_eq!(data, b"hello world");
            }
            _ => panic!("expected a literal container"),
        };
    }

    #[test]
    fn partial_lengths_are_joined() {
        // A literal packet split into two 2-byte partial chunks and a
        // final 8-byte chunk: metadata (6 bytes) + "data" (4 bytes).
        let mut p = vec![0xcb];
        p.push(225);                                // partial, 2 bytes
        p.extend_from_slice(&[b'b', 0]);
        p.push(225);                                // partial, 2 bytes
        p.extend_from_slice(&[0, 0]);
        p.push(6);                                  // final, 6 bytes
        p.extend_from_slice(&[0, 0]);
        p.extend_from_slice(b"data");

        let mut r = reader(&p);
        match r.next().unwrap() {
            Item::Container(Container::Literal(l, mut body)) => {
                assert_eq!(l.format, DataFormat::Binary);
                assert_eq!(l.filename, None);
                let mut data = Vec::new();
                body.read_to_end(&mut data).unwrap();
                assert_eq!(data, b"data");
            }
            _ => panic!("expected a literal container"),
        };
    }

    #[test]
    fn unknown_packets_are_skipped() {
        // A marker packet, then a trust packet, then literal data.
        let mut p = vec![0xca, 3];                  // marker
        p.extend_from_slice(b"PGP");
        p.extend_from_slice(&[0xcc, 2, 0, 0]);      // trust
        p.extend_from_slice(&literal_packet(b"x"));

        let mut r = reader(&p);
        assert!(matches!(r.next().unwrap(),
                         Item::Container(Container::Literal(..))));
    }

    #[test]
    fn eof_is_sticky() {
        let mut r = reader(b"");
        assert!(matches!(r.next().unwrap(), Item::Eof));
        assert!(matches!(r.next().unwrap(), Item::Eof));
    }

    #[test]
    fn truncated_packet_is_rejected() {
        // Claims 10 bytes, carries 3.
        let mut r = reader(&[0xcb, 10, b'b', 0, 0]);
        assert!(r.next().is_err());
    }

    #[test]
    fn unprotected_encrypted_data_is_rejected() {
        // Tag 9, new format.
        let mut r = reader(&[0xc9, 1, 0]);
        assert!(r.next().is_err());
    }

    #[test]
    fn absurd_small_packet_is_rejected() {
        // A signature packet claiming 16 MiB.
        let mut r = reader(&[0xc2, 255, 1, 0, 0, 0]);
        assert!(r.next().is_err());
    }
}
