//! One-Pass Signature packets.

use crate::types::{HashAlgorithm, PublicKeyAlgorithm, SignatureType};
use crate::{Error, KeyID, Result};

/// Holds a one-pass signature packet.
///
/// A one-pass signature precedes the data it signs and announces that
/// the actual signature follows it, enabling the signed data to be
/// hashed in a single pass.  See [Section 5.4 of RFC 4880] for details.
///
///   [Section 5.4 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.4
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnePassSig {
    /// One-pass-signature packet version.  Must be 3.
    pub version: u8,
    /// Type of the signature.
    pub sigtype: SignatureType,
    /// Hash algorithm used to compute the signature.
    pub hash_algo: HashAlgorithm,
    /// Public key algorithm of this signature.
    pub pk_algo: PublicKeyAlgorithm,
    /// Key ID of the signing key.
    pub issuer: KeyID,
    /// A one-octet number holding a flag showing whether the signature
    /// is nested.  A zero value indicates that another one-pass
    /// signature follows this one.
    pub last: u8,
}

impl OnePassSig {
    /// Parses the body of a one-pass signature packet.
    pub(crate) fn parse(body: &[u8]) -> Result<OnePassSig> {
        if body.len() != 13 {
            return Err(Error::MalformedPacket(
                format!("One-pass signature of {} bytes", body.len()))
                .into());
        }

        let version = body[0];
        if version != 3 {
            return Err(Error::MalformedPacket(
                format!("One-pass signature version {} not supported",
                        version)).into());
        }

        Ok(OnePassSig {
            version,
            sigtype: SignatureType::from(body[1]),
            hash_algo: HashAlgorithm::from(body[2]),
            pk_algo: PublicKeyAlgorithm::from(body[3]),
            issuer: KeyID::from_bytes(&body[4..12])?,
            last: body[12],
        })
    }
}
