//! Multiprecision integers.

use std::fmt;
use std::io::Read;

use zeroize::Zeroize;

use crate::Error;
use crate::Result;

/// A multiprecision integer as defined in [Section 3.2 of RFC 4880]: a
/// two-octet big-endian bit count followed by the big-endian magnitude.
///
///   [Section 3.2 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-3.2
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MPI {
    value: Vec<u8>,
}

impl MPI {
    /// Creates an MPI, stripping leading zero octets.
    pub fn new(value: &[u8]) -> MPI {
        let offset = value.iter().position(|&b| b != 0)
            .unwrap_or(value.len());
        MPI { value: value[offset..].to_vec() }
    }

    /// Returns the magnitude.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Returns the length of the magnitude in bits.
    pub fn bits(&self) -> usize {
        match self.value.first() {
            Some(&msb) => 8 * self.value.len() - msb.leading_zeros() as usize,
            None => 0,
        }
    }

    /// Reads an MPI from `reader`.
    pub fn parse<R: Read>(reader: &mut R) -> Result<MPI> {
        let mut bits = [0u8; 2];
        reader.read_exact(&mut bits)
            .map_err(|_| Error::MalformedMPI("Truncated length".into()))?;
        let bits = u16::from_be_bytes(bits) as usize;

        let len = (bits + 7) / 8;
        let mut value = vec![0u8; len];
        reader.read_exact(&mut value)
            .map_err(|_| Error::MalformedMPI(
                format!("Expected {} bytes of value", len)))?;

        Ok(MPI { value })
    }

    /// Serializes the MPI to `buf`.
    pub fn serialize(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.bits() as u16).to_be_bytes());
        buf.extend_from_slice(&self.value);
    }

    /// Overwrites the magnitude with zeros.
    pub(crate) fn zeroize(&mut self) {
        self.value.zeroize();
    }
}

impl fmt::Debug for MPI {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_fmt(format_args!(
            "{} bits: {}", self.bits(), crate::to_hex(&self.value, true)))
    }
}
