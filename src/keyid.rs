//! 64-bit key IDs.

use std::fmt;

use crate::Error;
use crate::Result;

/// A short identifier for a key.
///
/// A `KeyID` is the low eight octets of a key's fingerprint.  It is
/// used to correlate encrypted session key packets, one-pass and
/// trailing signatures, and keyring entries.  See [Section 12.2 of RFC
/// 4880] for details.
///
///   [Section 12.2 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-12.2
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyID([u8; 8]);

impl fmt::Display for KeyID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("KeyID")
            .field(&self.to_string())
            .finish()
    }
}

impl From<u64> for KeyID {
    fn from(data: u64) -> KeyID {
        KeyID(data.to_be_bytes())
    }
}

impl From<KeyID> for u64 {
    fn from(id: KeyID) -> u64 {
        u64::from_be_bytes(id.0)
    }
}

impl From<[u8; 8]> for KeyID {
    fn from(bytes: [u8; 8]) -> KeyID {
        KeyID(bytes)
    }
}

impl KeyID {
    /// Reads a binary key ID.
    pub fn from_bytes(raw: &[u8]) -> Result<KeyID> {
        if raw.len() != 8 {
            return Err(Error::InvalidArgument(
                format!("Expected 8 bytes, got {}", raw.len())).into());
        }
        let mut keyid = [0u8; 8];
        keyid.copy_from_slice(raw);
        Ok(KeyID(keyid))
    }

    /// Reads a hex-encoded key ID, skipping whitespace.
    pub fn from_hex(hex: &str) -> Result<KeyID> {
        let bytes = crate::from_hex(hex, true)
            .ok_or_else(|| Error::InvalidArgument(
                format!("Invalid hex string: {:?}", hex)))?;
        KeyID::from_bytes(&bytes)
    }

    /// Returns the key ID as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the wildcard key ID (all zeros), used by anonymous
    /// recipient entries.
    pub fn wildcard() -> KeyID {
        KeyID([0; 8])
    }

    /// Returns true if this is the wildcard key ID.
    pub fn is_wildcard(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn u64_round_trip(x: u64) -> bool {
        u64::from(KeyID::from(x)) == x
    }

    #[quickcheck]
    fn hex_round_trip(x: u64) -> bool {
        let id = KeyID::from(x);
        KeyID::from_hex(&id.to_string()).unwrap() == id
    }

    #[test]
    fn parse() {
        let id = KeyID::from_hex("FB3751F1587DAEF1").unwrap();
        assert_eq!(id.as_bytes(),
                   &[0xfb, 0x37, 0x51, 0xf1, 0x58, 0x7d, 0xae, 0xf1]);
        assert_eq!(id.to_string(), "FB3751F1587DAEF1");

        // Whitespace is fine, anything shorter or longer is not.
        assert!(KeyID::from_hex("FB37 51F1 587D AEF1").is_ok());
        assert!(KeyID::from_hex("FB3751F1587DAE").is_err());
        assert!(KeyID::from_hex("FB3751F1587DAEF100").is_err());

        assert!(KeyID::wildcard().is_wildcard());
        assert!(!id.is_wildcard());
    }
}
