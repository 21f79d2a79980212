//! Public-Key Encrypted Session Key packets.

use crate::types::PublicKeyAlgorithm;
use crate::{Error, KeyID, Result, MPI};

/// Holds an asymmetrically encrypted session key.
///
/// The session key is needed to decrypt the actual ciphertext.  See
/// [Section 5.1 of RFC 4880] for details.
///
///   [Section 5.1 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.1
#[derive(PartialEq, Clone, Debug)]
pub struct PKESK {
    /// Packet version.  Must be 3.
    pub version: u8,
    /// Key ID of the recipient.  All zeros for an anonymous
    /// ("wildcard") recipient.
    pub recipient: KeyID,
    /// Public key algorithm used to encrypt the session key.
    pub pk_algo: PublicKeyAlgorithm,
    /// The encrypted session key.
    pub esk: Vec<MPI>,
}

impl PKESK {
    /// Parses the body of a PKESK packet.
    pub(crate) fn parse(body: &[u8]) -> Result<PKESK> {
        let mut reader = body;

        let mut fixed = [0u8; 10];
        std::io::Read::read_exact(&mut reader, &mut fixed)
            .map_err(|_| Error::MalformedPacket(
                "Truncated PKESK packet".into()))?;

        let version = fixed[0];
        if version != 3 {
            return Err(Error::MalformedPacket(
                format!("PKESK version {} not supported", version)).into());
        }

        let recipient = KeyID::from_bytes(&fixed[1..9])?;
        let pk_algo = PublicKeyAlgorithm::from(fixed[9]);

        let mut esk = Vec::new();
        while !reader.is_empty() {
            esk.push(MPI::parse(&mut reader)?);
        }
        if esk.is_empty() {
            return Err(Error::MalformedPacket(
                "PKESK packet carries no encrypted session key".into())
                .into());
        }

        Ok(PKESK { version, recipient, pk_algo, esk })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse() {
        let mut body = vec![
            3,                                      // version
            1, 2, 3, 4, 5, 6, 7, 8,                 // recipient
            1,                                      // RSA
        ];
        // One MPI: 15 bits, 0x7fff.
        body.extend_from_slice(&[0, 15, 0x7f, 0xff]);

        let pkesk = PKESK::parse(&body).unwrap();
        assert_eq!(pkesk.version, 3);
        assert_eq!(pkesk.recipient,
                   KeyID::from_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap());
        assert_eq!(pkesk.pk_algo, PublicKeyAlgorithm::RSAEncryptSign);
        assert_eq!(pkesk.esk.len(), 1);
        assert_eq!(pkesk.esk[0].value(), &[0x7f, 0xff]);
    }

    #[test]
    fn parse_rejects_bad_input() {
        // Wrong version.
        let body = [2, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0];
        assert!(PKESK::parse(&body).is_err());

        // Truncated.
        assert!(PKESK::parse(&[3, 1, 2]).is_err());

        // No ESK.
        let body = [3, 1, 2, 3, 4, 5, 6, 7, 8, 1];
        assert!(PKESK::parse(&body).is_err());
    }
}
