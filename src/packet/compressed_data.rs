//! Compressed Data packets.

use crate::types::CompressionAlgorithm;

/// Holds the metadata of a compressed data packet.
///
/// A compressed data packet is a container; its decompressed body is a
/// packet sequence of its own and is handed over as a stream by the
/// packet reader.  See [Section 5.6 of RFC 4880] for details.
///
///   [Section 5.6 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.6
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressedData {
    /// Algorithm used to compress the payload.
    pub algo: CompressionAlgorithm,
}
