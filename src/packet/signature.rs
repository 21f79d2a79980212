//! Signature packets.

use std::io::Read;

use digest::DynDigest;

use crate::types::{HashAlgorithm, PublicKeyAlgorithm, SignatureType};
use crate::{Error, KeyID, Result, MPI};

/// The issuer subpacket tag.
const SUBPACKET_ISSUER: u8 = 16;

/// Holds a version 4 signature packet.
///
/// See [Section 5.2 of RFC 4880] for details.
///
///   [Section 5.2 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.2
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Signature packet version.  Must be 4.
    pub version: u8,
    /// Type of the signature.
    pub sigtype: SignatureType,
    /// Public key algorithm of the signing key.
    pub pk_algo: PublicKeyAlgorithm,
    /// Hash algorithm used to compute the signature.
    pub hash_algo: HashAlgorithm,
    /// The serialized hashed subpacket area, covered by the signature.
    pub hashed_area: Vec<u8>,
    /// The serialized unhashed subpacket area.
    pub unhashed_area: Vec<u8>,
    /// The leftmost two octets of the signed digest, a cheap sanity
    /// check.
    pub digest_prefix: [u8; 2],
    /// Algorithm-specific signature material.
    pub mpis: Vec<MPI>,
}

impl Signature {
    /// Parses the body of a signature packet.
    pub(crate) fn parse(body: &[u8]) -> Result<Signature> {
        let mut reader = body;

        let truncated =
            || Error::MalformedPacket("Truncated signature packet".into());

        let mut fixed = [0u8; 4];
        reader.read_exact(&mut fixed).map_err(|_| truncated())?;

        let version = fixed[0];
        if version != 4 {
            return Err(Error::UnsupportedSignatureVersion(version).into());
        }

        let sigtype = SignatureType::from(fixed[1]);
        let pk_algo = PublicKeyAlgorithm::from(fixed[2]);
        let hash_algo = HashAlgorithm::from(fixed[3]);

        let mut read_area = |reader: &mut &[u8]| -> Result<Vec<u8>> {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len).map_err(|_| truncated())?;
            let mut area = vec![0u8; u16::from_be_bytes(len) as usize];
            reader.read_exact(&mut area).map_err(|_| truncated())?;
            Ok(area)
        };

        let hashed_area = read_area(&mut reader)?;
        let unhashed_area = read_area(&mut reader)?;

        let mut digest_prefix = [0u8; 2];
        reader.read_exact(&mut digest_prefix).map_err(|_| truncated())?;

        let mut mpis = Vec::new();
        while !reader.is_empty() {
            mpis.push(MPI::parse(&mut reader)?);
        }
        if mpis.is_empty() {
            return Err(Error::MalformedPacket(
                "Signature packet carries no signature material".into())
                .into());
        }

        Ok(Signature {
            version,
            sigtype,
            pk_algo,
            hash_algo,
            hashed_area,
            unhashed_area,
            digest_prefix,
            mpis,
        })
    }

    /// Returns the signing key's ID, taken from the issuer subpacket.
    ///
    /// The hashed area is preferred; the unhashed area is only
    /// consulted when the hashed area carries no issuer.
    pub fn issuer(&self) -> Option<KeyID> {
        for area in [&self.hashed_area, &self.unhashed_area] {
            for (tag, value) in subpackets(area) {
                if tag & 0x7f == SUBPACKET_ISSUER && value.len() == 8 {
                    return KeyID::from_bytes(value).ok();
                }
            }
        }
        None
    }

    /// Feeds the trailer that closes the signed data to `hash`.
    ///
    /// A version 4 signature covers the signed data followed by the
    /// signature metadata and the hashed subpacket area, terminated by
    /// a length trailer (see [Section 5.2.4 of RFC 4880]).
    ///
    ///   [Section 5.2.4 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.2.4
    pub fn hash_trailer(&self, hash: &mut dyn DynDigest) {
        let hashed_len = self.hashed_area.len();
        let mut trailer = Vec::with_capacity(6 + hashed_len + 6);
        trailer.push(self.version);
        trailer.push(self.sigtype.into());
        trailer.push(self.pk_algo.into());
        trailer.push(self.hash_algo.into());
        trailer.extend_from_slice(&(hashed_len as u16).to_be_bytes());
        trailer.extend_from_slice(&self.hashed_area);
        trailer.push(0x04);
        trailer.push(0xff);
        trailer.extend_from_slice(&((6 + hashed_len) as u32).to_be_bytes());
        hash.update(&trailer);
    }
}

/// Iterates over the subpackets of a subpacket area.
///
/// Yields `(type, body)` pairs.  Iteration stops at the first
/// structurally invalid subpacket.
pub(crate) fn subpackets(area: &[u8]) -> Subpackets {
    Subpackets { rest: area }
}

pub(crate) struct Subpackets<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Subpackets<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let r = self.rest;
        let (len, header) = match *r.first()? {
            l @ 0..=191 => (l as usize, 1),
            l @ 192..=254 => {
                let l2 = *r.get(1)? as usize;
                ((((l as usize) - 192) << 8) + l2 + 192, 2)
            }
            255 => {
                let l = r.get(1..5)?;
                (u32::from_be_bytes([l[0], l[1], l[2], l[3]]) as usize, 5)
            }
        };

        // The length includes the type octet.
        if len == 0 {
            self.rest = &[];
            return None;
        }
        let body = r.get(header..header + len)?;
        self.rest = &r[header + len..];
        Some((body[0], &body[1..]))
    }
}

/// Builds an issuer subpacket for `keyid`.
pub fn issuer_subpacket(keyid: &KeyID) -> Vec<u8> {
    let mut sp = Vec::with_capacity(10);
    sp.push(9);                 // length: type octet plus key ID
    sp.push(SUBPACKET_ISSUER);
    sp.extend_from_slice(keyid.as_bytes());
    sp
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Vec<u8> {
        let keyid = KeyID::from(0x0102030405060708u64);
        let hashed = issuer_subpacket(&keyid);

        let mut body = vec![
            4,                                      // version
            0,                                      // binary signature
            1,                                      // RSA
            8,                                      // SHA256
        ];
        body.extend_from_slice(&(hashed.len() as u16).to_be_bytes());
        body.extend_from_slice(&hashed);
        body.extend_from_slice(&[0, 0]);            // empty unhashed area
        body.extend_from_slice(&[0xbe, 0xef]);      // digest prefix
        body.extend_from_slice(&[0, 9, 1, 0x42]);   // one MPI
        body
    }

    #[test]
    fn parse() {
        let sig = Signature::parse(&sample()).unwrap();
        assert_eq!(sig.sigtype, SignatureType::Binary);
        assert_eq!(sig.pk_algo, PublicKeyAlgorithm::RSAEncryptSign);
        assert_eq!(sig.hash_algo, HashAlgorithm::SHA256);
        assert_eq!(sig.digest_prefix, [0xbe, 0xef]);
        assert_eq!(sig.issuer(), Some(KeyID::from(0x0102030405060708u64)));
        assert_eq!(sig.mpis.len(), 1);
    }

    #[test]
    fn issuer_from_unhashed_area() {
        let keyid = KeyID::from(0xaabbccdd00112233u64);
        let unhashed = issuer_subpacket(&keyid);

        let mut body = vec![4, 0, 1, 8, 0, 0];      // empty hashed area
        body.extend_from_slice(&(unhashed.len() as u16).to_be_bytes());
        body.extend_from_slice(&unhashed);
        body.extend_from_slice(&[0, 0]);
        body.extend_from_slice(&[0, 9, 1, 0x42]);

        let sig = Signature::parse(&body).unwrap();
        assert_eq!(sig.issuer(), Some(keyid));
    }

    #[test]
    fn parse_rejects_bad_input() {
        // Version 3 signatures are historic.
        let mut v3 = sample();
        v3[0] = 3;
        assert!(Signature::parse(&v3).is_err());

        // Truncated in the hashed area.
        let body = sample();
        assert!(Signature::parse(&body[..8]).is_err());
    }

    #[test]
    fn subpacket_scan_survives_junk() {
        // A valid issuer subpacket followed by a length overrunning
        // the area.
        let keyid = KeyID::from(0x1122334455667788u64);
        let mut area = issuer_subpacket(&keyid);
        area.extend_from_slice(&[100, 1]);          // claims 100, has 1

        let found: Vec<_> = subpackets(&area).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, SUBPACKET_ISSUER);
    }
}
