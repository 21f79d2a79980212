//! Streaming decryption and verification of OpenPGP messages.
//!
//! This crate reads the message format described in [RFC 4880]: a
//! sequence of encrypted session key packets, followed by a
//! symmetrically encrypted container, which in turn wraps optionally
//! compressed, optionally one-pass-signed literal data.  The payload is
//! handed to the caller as an [`std::io::Read`] stream and produced
//! incrementally; the detached signatures that trail the literal data
//! are checked exactly once, when the caller first observes
//! end-of-stream.
//!
//!   [RFC 4880]: https://tools.ietf.org/html/rfc4880
//!
//! The entry point is [`decrypt_and_verify`] (or the equivalent
//! [`Decryptor`] constructors).  Key material is supplied through the
//! [`keyring::Keyring`] collaborator trait, the verification
//! requirements through a [`VerificationPolicy`], and the cryptographic
//! primitives through an explicitly injected [`crypto::Backend`].
//!
//! ```no_run
//! use std::io::Read;
//! use rill_openpgp::{decrypt_and_verify, Result, VerificationPolicy};
//! use rill_openpgp::crypto::RustCryptoBackend;
//! use rill_openpgp::keyring::Keyring;
//!
//! // Feed real keys to the decryptor here.
//! struct EmptyRing;
//! impl Keyring for EmptyRing {}
//!
//! # fn f() -> Result<()> {
//! let message: &[u8] = b"-----BEGIN PGP MESSAGE-----\n...";
//! let backend = RustCryptoBackend::default();
//! let mut plaintext = decrypt_and_verify(
//!     message, &EmptyRing, VerificationPolicy::RequireAny, &backend)?;
//!
//! let mut content = Vec::new();
//! plaintext.read_to_end(&mut content)?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

pub mod armor;
pub mod crypto;
pub mod keyring;
mod keyid;
pub use keyid::KeyID;
mod mpi;
pub use mpi::MPI;
pub mod packet;
pub use packet::Packet;
pub mod parse;
pub use parse::stream::{decrypt_and_verify, Decryptor};
pub mod policy;
pub use policy::VerificationPolicy;
pub mod s2k;
pub use s2k::S2K;
pub mod types;

use types::{
    CompressionAlgorithm,
    HashAlgorithm,
    PublicKeyAlgorithm,
    SymmetricAlgorithm,
};

/// Crate result specialization.
pub type Result<T> = ::anyhow::Result<T>;

/// Errors returned by this crate.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid operation.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A malformed packet.
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// A malformed MPI.
    #[error("Malformed MPI: {0}")]
    MalformedMPI(String),

    /// A malformed packet sequence.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Unknown packet tag.
    #[error("Unknown packet type: {0}")]
    UnknownPacketTag(u8),

    /// Unsupported hash algorithm identifier.
    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(HashAlgorithm),

    /// Unsupported public key algorithm identifier.
    #[error("Unsupported public key algorithm: {0}")]
    UnsupportedPublicKeyAlgorithm(PublicKeyAlgorithm),

    /// Unsupported symmetric key algorithm.
    #[error("Unsupported symmetric algorithm: {0}")]
    UnsupportedSymmetricAlgorithm(SymmetricAlgorithm),

    /// Unsupported compression algorithm.
    #[error("Unsupported compression algorithm: {0}")]
    UnsupportedCompressionAlgorithm(CompressionAlgorithm),

    /// Unsupported signature version.
    #[error("Unsupported signature version: {0}")]
    UnsupportedSignatureVersion(u8),

    /// Invalid password.
    #[error("Invalid password")]
    InvalidPassword,

    /// Invalid session key.
    #[error("Invalid session key: {0}")]
    InvalidSessionKey(String),

    /// No secret key in the keyring matches any recipient of the
    /// message.
    #[error("No usable secret key for any recipient")]
    NoUsableKey,

    /// The input ended before any literal data packet was reached.
    #[error("Premature end of message: no literal data found")]
    NoLiteralData,

    /// The policy demands a signature, but the message carries none.
    #[error("Message is not signed")]
    SignatureRequired,

    /// The literal data ended without the expected trailing signature
    /// packets.
    #[error("Message carries no trailing signature")]
    NoTrailingSignature,

    /// Trailing signatures are present, but the required signer set is
    /// not covered by them.
    #[error("No valid signature from required signers: {}",
            missing_list(.key_ids, .user_ids))]
    MissingSignatures {
        /// Required key IDs without a verifying signature.
        key_ids: Vec<KeyID>,
        /// Required user IDs without a verifying signature.
        user_ids: Vec<String>,
    },

    /// The message failed its integrity protection check.
    #[error("Message has been manipulated")]
    ManipulatedMessage,

    /// Bad signature.
    #[error("Bad signature: {0}")]
    BadSignature(String),
}

fn missing_list(key_ids: &[KeyID], user_ids: &[String]) -> String {
    let mut parts: Vec<String> =
        key_ids.iter().map(|id| id.to_string()).collect();
    parts.extend(user_ids.iter().cloned());
    parts.join(", ")
}

/// A helpful debugging function.
#[allow(dead_code)]
pub(crate) fn to_hex(s: &[u8], pretty: bool) -> String {
    use std::fmt::Write;

    let mut result = String::new();
    for (i, b) in s.iter().enumerate() {
        // Add spaces every four digits to make the output more
        // readable.
        if pretty && i > 0 && i % 2 == 0 {
            write!(&mut result, " ").unwrap();
        }
        write!(&mut result, "{:02X}", b).unwrap();
    }
    result
}

/// Converts a hexadecimal string to binary, optionally skipping
/// whitespace.
pub(crate) fn from_hex(hex: &str, skip_whitespace: bool) -> Option<Vec<u8>> {
    let nibbles = hex.as_bytes().iter().filter_map(|x| {
        match *x as char {
            c if c.is_ascii_hexdigit() => c.to_digit(16),
            c if c.is_whitespace() && skip_whitespace => None,
            _ => Some(u32::MAX),
        }
    }).collect::<Vec<u32>>();

    if nibbles.len() % 2 != 0 || nibbles.iter().any(|&n| n == u32::MAX) {
        // Not a multiple of two hex digits, or junk in the input.
        return None;
    }

    let bytes = nibbles.chunks(2)
        .map(|nibble| ((nibble[0] << 4) | nibble[1]) as u8)
        .collect::<Vec<u8>>();
    Some(bytes)
}
