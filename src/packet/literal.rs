//! Literal Data packets.

use std::io::Read;

use crate::types::DataFormat;
use crate::{Error, Result};

/// Holds the metadata of a literal data packet.
///
/// A literal packet contains unstructured data.  Since the payload can
/// be very large, it is not stored here: the packet reader hands it
/// over as a stream.  See [Section 5.9 of RFC 4880] for details.
///
///   [Section 5.9 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-5.9
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Literal {
    /// A one-octet field that describes how the data is formatted.
    pub format: DataFormat,
    /// The file name, if any.
    ///
    /// There is no guarantee that this is valid UTF-8, so it is kept
    /// as a byte string.
    pub filename: Option<Vec<u8>>,
    /// A four-octet number that indicates a date associated with the
    /// literal data, in seconds since the epoch.
    pub date: u32,
}

impl Literal {
    /// Parses the metadata that prefixes a literal data packet's
    /// payload, leaving `reader` positioned at the payload itself.
    pub(crate) fn parse<R: Read>(reader: &mut R) -> Result<Literal> {
        let truncated =
            || Error::MalformedPacket("Truncated literal data packet".into());

        let mut fixed = [0u8; 2];
        reader.read_exact(&mut fixed).map_err(|_| truncated())?;
        let format = DataFormat::from(fixed[0]);

        let filename = if fixed[1] > 0 {
            let mut name = vec![0u8; fixed[1] as usize];
            reader.read_exact(&mut name).map_err(|_| truncated())?;
            Some(name)
        } else {
            None
        };

        let mut date = [0u8; 4];
        reader.read_exact(&mut date).map_err(|_| truncated())?;

        Ok(Literal {
            format,
            filename,
            date: u32::from_be_bytes(date),
        })
    }
}
