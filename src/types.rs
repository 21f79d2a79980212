//! Algorithm identifiers used in OpenPGP.
//!
//! This module defines enumerations describing the algorithm registries
//! of [RFC 4880, Section 9].  The values correspond to the serialized
//! format.
//!
//!   [RFC 4880, Section 9]: https://tools.ietf.org/html/rfc4880#section-9

use std::fmt;

use crate::Error;
use crate::Result;

/// The OpenPGP public key algorithms as defined in [Section 9.1 of
/// RFC 4880].
///
///   [Section 9.1 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-9.1
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub enum PublicKeyAlgorithm {
    RSAEncryptSign,
    RSAEncrypt,
    RSASign,
    ElgamalEncrypt,
    DSA,
    ECDH,
    ECDSA,
    ElgamalEncryptSign,
    EdDSA,
    Private(u8),
    Unknown(u8),
}

impl PublicKeyAlgorithm {
    /// Returns whether this algorithm can be used for decryption and
    /// verification by this crate.
    pub fn is_supported(&self) -> bool {
        use self::PublicKeyAlgorithm::*;
        matches!(self, RSAEncryptSign | RSAEncrypt | RSASign)
    }
}

impl From<u8> for PublicKeyAlgorithm {
    fn from(u: u8) -> Self {
        use self::PublicKeyAlgorithm::*;
        match u {
            1 => RSAEncryptSign,
            2 => RSAEncrypt,
            3 => RSASign,
            16 => ElgamalEncrypt,
            17 => DSA,
            18 => ECDH,
            19 => ECDSA,
            20 => ElgamalEncryptSign,
            22 => EdDSA,
            100..=110 => Private(u),
            u => Unknown(u),
        }
    }
}

impl From<PublicKeyAlgorithm> for u8 {
    fn from(p: PublicKeyAlgorithm) -> u8 {
        use self::PublicKeyAlgorithm::*;
        match p {
            RSAEncryptSign => 1,
            RSAEncrypt => 2,
            RSASign => 3,
            ElgamalEncrypt => 16,
            DSA => 17,
            ECDH => 18,
            ECDSA => 19,
            ElgamalEncryptSign => 20,
            EdDSA => 22,
            Private(u) => u,
            Unknown(u) => u,
        }
    }
}

impl fmt::Display for PublicKeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::PublicKeyAlgorithm::*;
        match *self {
            RSAEncryptSign => f.write_str("RSA (Encrypt or Sign)"),
            RSAEncrypt => f.write_str("RSA Encrypt-Only"),
            RSASign => f.write_str("RSA Sign-Only"),
            ElgamalEncrypt => f.write_str("Elgamal (Encrypt-Only)"),
            DSA => f.write_str("DSA (Digital Signature Algorithm)"),
            ECDH => f.write_str("ECDH public key algorithm"),
            ECDSA => f.write_str("ECDSA public key algorithm"),
            ElgamalEncryptSign => f.write_str("Elgamal (Encrypt or Sign)"),
            EdDSA => f.write_str("EdDSA Edwards-curve Digital Signature Algorithm"),
            Private(u) =>
                f.write_fmt(format_args!("Private/Experimental public key algorithm {}", u)),
            Unknown(u) =>
                f.write_fmt(format_args!("Unknown public key algorithm {}", u)),
        }
    }
}

/// The symmetric-key algorithms as defined in [Section 9.2 of RFC 4880].
///
///   [Section 9.2 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-9.2
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub enum SymmetricAlgorithm {
    Unencrypted,
    IDEA,
    TripleDES,
    CAST5,
    Blowfish,
    AES128,
    AES192,
    AES256,
    Twofish,
    Private(u8),
    Unknown(u8),
}

impl SymmetricAlgorithm {
    /// Length of a key for this algorithm in bytes.
    pub fn key_size(self) -> Result<usize> {
        use self::SymmetricAlgorithm::*;
        match self {
            AES128 => Ok(16),
            AES192 => Ok(24),
            AES256 => Ok(32),
            _ => Err(Error::UnsupportedSymmetricAlgorithm(self).into()),
        }
    }

    /// Block size of this algorithm in bytes.
    pub fn block_size(self) -> Result<usize> {
        use self::SymmetricAlgorithm::*;
        match self {
            AES128 | AES192 | AES256 => Ok(16),
            _ => Err(Error::UnsupportedSymmetricAlgorithm(self).into()),
        }
    }
}

impl From<u8> for SymmetricAlgorithm {
    fn from(u: u8) -> Self {
        use self::SymmetricAlgorithm::*;
        match u {
            0 => Unencrypted,
            1 => IDEA,
            2 => TripleDES,
            3 => CAST5,
            4 => Blowfish,
            7 => AES128,
            8 => AES192,
            9 => AES256,
            10 => Twofish,
            100..=110 => Private(u),
            u => Unknown(u),
        }
    }
}

impl From<SymmetricAlgorithm> for u8 {
    fn from(s: SymmetricAlgorithm) -> u8 {
        use self::SymmetricAlgorithm::*;
        match s {
            Unencrypted => 0,
            IDEA => 1,
            TripleDES => 2,
            CAST5 => 3,
            Blowfish => 4,
            AES128 => 7,
            AES192 => 8,
            AES256 => 9,
            Twofish => 10,
            Private(u) => u,
            Unknown(u) => u,
        }
    }
}

impl fmt::Display for SymmetricAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::SymmetricAlgorithm::*;
        match *self {
            Unencrypted => f.write_str("Unencrypted"),
            IDEA => f.write_str("IDEA"),
            TripleDES => f.write_str("TripleDES (EDE-DES, 168 bit key derived from 192)"),
            CAST5 => f.write_str("CAST5 (128 bit key, 16 rounds)"),
            Blowfish => f.write_str("Blowfish (128 bit key, 16 rounds)"),
            AES128 => f.write_str("AES with 128-bit key"),
            AES192 => f.write_str("AES with 192-bit key"),
            AES256 => f.write_str("AES with 256-bit key"),
            Twofish => f.write_str("Twofish with 256-bit key"),
            Private(u) =>
                f.write_fmt(format_args!("Private/Experimental symmetric key algorithm {}", u)),
            Unknown(u) =>
                f.write_fmt(format_args!("Unknown symmetric key algorithm {}", u)),
        }
    }
}

/// The compression algorithms as defined in [Section 9.3 of RFC 4880].
///
///   [Section 9.3 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-9.3
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub enum CompressionAlgorithm {
    Uncompressed,
    Zip,
    Zlib,
    BZip2,
    Private(u8),
    Unknown(u8),
}

impl From<u8> for CompressionAlgorithm {
    fn from(u: u8) -> Self {
        use self::CompressionAlgorithm::*;
        match u {
            0 => Uncompressed,
            1 => Zip,
            2 => Zlib,
            3 => BZip2,
            100..=110 => Private(u),
            u => Unknown(u),
        }
    }
}

impl From<CompressionAlgorithm> for u8 {
    fn from(c: CompressionAlgorithm) -> u8 {
        use self::CompressionAlgorithm::*;
        match c {
            Uncompressed => 0,
            Zip => 1,
            Zlib => 2,
            BZip2 => 3,
            Private(u) => u,
            Unknown(u) => u,
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::CompressionAlgorithm::*;
        match *self {
            Uncompressed => f.write_str("Uncompressed"),
            Zip => f.write_str("ZIP"),
            Zlib => f.write_str("ZLIB"),
            BZip2 => f.write_str("BZip2"),
            Private(u) =>
                f.write_fmt(format_args!("Private/Experimental compression algorithm {}", u)),
            Unknown(u) =>
                f.write_fmt(format_args!("Unknown compression algorithm {}", u)),
        }
    }
}

/// The hash algorithms as defined in [Section 9.4 of RFC 4880].
///
///   [Section 9.4 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-9.4
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub enum HashAlgorithm {
    MD5,
    SHA1,
    RipeMD,
    SHA256,
    SHA384,
    SHA512,
    SHA224,
    Private(u8),
    Unknown(u8),
}

impl From<u8> for HashAlgorithm {
    fn from(u: u8) -> Self {
        use self::HashAlgorithm::*;
        match u {
            1 => MD5,
            2 => SHA1,
            3 => RipeMD,
            8 => SHA256,
            9 => SHA384,
            10 => SHA512,
            11 => SHA224,
            100..=110 => Private(u),
            u => Unknown(u),
        }
    }
}

impl From<HashAlgorithm> for u8 {
    fn from(h: HashAlgorithm) -> u8 {
        use self::HashAlgorithm::*;
        match h {
            MD5 => 1,
            SHA1 => 2,
            RipeMD => 3,
            SHA256 => 8,
            SHA384 => 9,
            SHA512 => 10,
            SHA224 => 11,
            Private(u) => u,
            Unknown(u) => u,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::HashAlgorithm::*;
        match *self {
            MD5 => f.write_str("MD5"),
            SHA1 => f.write_str("SHA1"),
            RipeMD => f.write_str("RipeMD160"),
            SHA256 => f.write_str("SHA256"),
            SHA384 => f.write_str("SHA384"),
            SHA512 => f.write_str("SHA512"),
            SHA224 => f.write_str("SHA224"),
            Private(u) =>
                f.write_fmt(format_args!("Private/Experimental hash algorithm {}", u)),
            Unknown(u) =>
                f.write_fmt(format_args!("Unknown hash algorithm {}", u)),
        }
    }
}

/// Signature classes as defined in [Section 5.2.1 of RFC 4880].
///
///   [Section 5.2.1 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.2.1
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub enum SignatureType {
    Binary,
    Text,
    Standalone,
    GenericCertification,
    PersonaCertification,
    CasualCertification,
    PositiveCertification,
    SubkeyBinding,
    DirectKey,
    KeyRevocation,
    SubkeyRevocation,
    CertificationRevocation,
    Timestamp,
    Unknown(u8),
}

impl From<u8> for SignatureType {
    fn from(u: u8) -> Self {
        use self::SignatureType::*;
        match u {
            0x00 => Binary,
            0x01 => Text,
            0x02 => Standalone,
            0x10 => GenericCertification,
            0x11 => PersonaCertification,
            0x12 => CasualCertification,
            0x13 => PositiveCertification,
            0x18 => SubkeyBinding,
            0x1f => DirectKey,
            0x20 => KeyRevocation,
            0x28 => SubkeyRevocation,
            0x30 => CertificationRevocation,
            0x40 => Timestamp,
            u => Unknown(u),
        }
    }
}

impl From<SignatureType> for u8 {
    fn from(s: SignatureType) -> u8 {
        use self::SignatureType::*;
        match s {
            Binary => 0x00,
            Text => 0x01,
            Standalone => 0x02,
            GenericCertification => 0x10,
            PersonaCertification => 0x11,
            CasualCertification => 0x12,
            PositiveCertification => 0x13,
            SubkeyBinding => 0x18,
            DirectKey => 0x1f,
            KeyRevocation => 0x20,
            SubkeyRevocation => 0x28,
            CertificationRevocation => 0x30,
            Timestamp => 0x40,
            Unknown(u) => u,
        }
    }
}

impl fmt::Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::SignatureType::*;
        match *self {
            Binary => f.write_str("Binary"),
            Text => f.write_str("Text"),
            Standalone => f.write_str("Standalone"),
            GenericCertification => f.write_str("GenericCertification"),
            PersonaCertification => f.write_str("PersonaCertification"),
            CasualCertification => f.write_str("CasualCertification"),
            PositiveCertification => f.write_str("PositiveCertification"),
            SubkeyBinding => f.write_str("SubkeyBinding"),
            DirectKey => f.write_str("DirectKey"),
            KeyRevocation => f.write_str("KeyRevocation"),
            SubkeyRevocation => f.write_str("SubkeyRevocation"),
            CertificationRevocation => f.write_str("CertificationRevocation"),
            Timestamp => f.write_str("Timestamp"),
            Unknown(u) =>
                f.write_fmt(format_args!("Unknown signature type 0x{:x}", u)),
        }
    }
}

/// Describes the format of the body of a literal data packet.
///
/// See [Section 5.9 of RFC 4880] for details.
///
///   [Section 5.9 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.9
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum DataFormat {
    /// Binary data.
    Binary,
    /// Text data.
    Text,
    /// Text data, probably UTF-8 encoded.
    Unicode,
    /// Unknown format specifier.
    Unknown(u8),
}

impl From<u8> for DataFormat {
    fn from(u: u8) -> Self {
        use self::DataFormat::*;
        match u {
            b'b' => Binary,
            b't' => Text,
            b'u' => Unicode,
            u => Unknown(u),
        }
    }
}

impl From<DataFormat> for u8 {
    fn from(d: DataFormat) -> u8 {
        use self::DataFormat::*;
        match d {
            Binary => b'b',
            Text => b't',
            Unicode => b'u',
            Unknown(u) => u,
        }
    }
}
