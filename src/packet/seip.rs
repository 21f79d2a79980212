//! Symmetrically Encrypted Integrity Protected Data packets.

/// Holds the metadata of an encrypted data packet with integrity
/// protection.
///
/// The ciphertext itself is handed over as a stream by the packet
/// reader; the trailing modification detection code is verified by the
/// decryption layer when that stream is exhausted.  See [Section 5.13
/// of RFC 4880] for details.
///
///   [Section 5.13 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.13
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SEIP {
    /// Packet version.  Must be 1.
    pub version: u8,
}
