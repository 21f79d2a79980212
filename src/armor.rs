//! ASCII Armor.
//!
//! This module deals with ASCII armored data as described in [Section
//! 6 of RFC 4880]: a radix-64 encoding of binary OpenPGP data wrapped
//! in header and footer lines, with an optional CRC-24 checksum.
//!
//!   [Section 6 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-6
//!
//! # Scope
//!
//! This implements a streaming decoder suitable for feeding the packet
//! parser, and the minimal encoder needed to produce armored messages.
//! Clearsigned text is out of scope.

use std::io::{self, BufRead, Read, Write};

use crate::Error;
use crate::Result;

/// The kind of data decoded or encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A generic OpenPGP message.
    Message,
    /// A transferable public key.
    PublicKey,
    /// A transferable secret key.
    SecretKey,
    /// A detached signature.
    Signature,
}

impl Kind {
    /// Detects the kind of a header line.
    fn detect(line: &str) -> Option<Kind> {
        let body = line.strip_prefix("-----BEGIN PGP ")?;
        let body = body.strip_suffix("-----")?;
        match body {
            "MESSAGE" => Some(Kind::Message),
            "PUBLIC KEY BLOCK" => Some(Kind::PublicKey),
            "PRIVATE KEY BLOCK" => Some(Kind::SecretKey),
            "SIGNATURE" => Some(Kind::Signature),
            _ => None,
        }
    }

    fn blurb(&self) -> &'static str {
        match self {
            Kind::Message => "MESSAGE",
            Kind::PublicKey => "PUBLIC KEY BLOCK",
            Kind::SecretKey => "PRIVATE KEY BLOCK",
            Kind::Signature => "SIGNATURE",
        }
    }

    /// Returns the header line for this kind of data.
    pub fn begin(&self) -> String {
        format!("-----BEGIN PGP {}-----", self.blurb())
    }

    /// Returns the footer line for this kind of data.
    pub fn end(&self) -> String {
        format!("-----END PGP {}-----", self.blurb())
    }
}

const CRC24_INIT: u32 = 0xB704CE;
const CRC24_POLY: u32 = 0x1864CFB;

#[derive(Debug)]
pub(crate) struct CRC {
    n: u32,
}

/// Computes the CRC-24, (see [RFC 4880, section 6.1]).
///
/// [RFC 4880, section 6.1]: https://tools.ietf.org/html/rfc4880#section-6.1
impl CRC {
    pub(crate) fn new() -> Self {
        CRC { n: CRC24_INIT }
    }

    pub(crate) fn update(&mut self, buf: &[u8]) -> &Self {
        for octet in buf {
            self.n ^= (*octet as u32) << 16;
            for _ in 0..8 {
                self.n <<= 1;
                if self.n & 0x1000000 > 0 {
                    self.n ^= CRC24_POLY;
                }
            }
        }
        self
    }

    pub(crate) fn finalize(&self) -> u32 {
        self.n & 0xFFFFFF
    }
}

fn malformed(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::Other,
                   Error::MalformedMessage(msg.into()))
}

#[derive(Debug, PartialEq)]
enum Stage {
    /// The header line has not been seen yet.
    Init,
    /// Decoding radix-64 body lines.
    Body,
    /// The footer has been consumed and verified.
    Done,
}

/// A filter that strips ASCII armor from a stream of data.
pub struct Reader<'a> {
    source: io::BufReader<Box<dyn Read + 'a>>,
    expect: Option<Kind>,
    kind: Option<Kind>,
    stage: Stage,
    /// Decoded bytes not yet handed to the caller.
    buffer: Vec<u8>,
    crc: CRC,
    headers: Vec<(String, String)>,
}

impl<'a> Reader<'a> {
    /// Constructs a new filter for the given type of data.
    ///
    /// If `kind` is `None`, any header line is accepted.
    pub fn new<R: Read + 'a>(inner: R, kind: Option<Kind>) -> Self {
        Reader {
            source: io::BufReader::new(Box::new(inner)),
            expect: kind,
            kind: None,
            stage: Stage::Init,
            buffer: Vec::new(),
            crc: CRC::new(),
            headers: Vec::new(),
        }
    }

    /// Returns the kind of data this reader is decoding.
    ///
    /// `None` means the header line has not been read yet.
    pub fn kind(&self) -> Option<Kind> {
        self.kind
    }

    /// Returns the armor headers, parsing the armor header lines if
    /// necessary.
    pub fn headers(&mut self) -> Result<&[(String, String)]> {
        if self.stage == Stage::Init {
            self.initialize()?;
        }
        Ok(&self.headers)
    }

    /// Reads the next line, stripping the trailing newline.  Returns
    /// `None` at EOF.
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut raw = Vec::new();
        let n = self.source.read_until(b'\n', &mut raw)?;
        if n == 0 {
            return Ok(None);
        }
        while raw.last() == Some(&b'\n') || raw.last() == Some(&b'\r') {
            raw.pop();
        }
        String::from_utf8(raw)
            .map(Some)
            .map_err(|_| malformed("Armor is not valid UTF-8"))
    }

    /// Consumes the header line and the armor headers.
    fn initialize(&mut self) -> io::Result<()> {
        // Scan for the header line, ignoring preceding junk.
        loop {
            let line = self.next_line()?
                .ok_or_else(|| malformed(
                    "Reached EOF looking for the armor header line"))?;
            if let Some(kind) = Kind::detect(line.trim()) {
                match self.expect {
                    Some(expected) if expected != kind => continue,
                    _ => {
                        self.kind = Some(kind);
                        break;
                    }
                }
            }
        }

        // Read the key-value headers up to the empty line separating
        // them from the body.  A line that is neither a header nor
        // empty is most likely a body line with the separator missing;
        // recover by stashing it.
        loop {
            let line = self.next_line()?
                .ok_or_else(|| malformed("Truncated armor headers"))?;
            if line.trim().is_empty() {
                break;
            }
            match line.split_once(": ") {
                Some((key, value)) => {
                    self.headers.push((key.into(), value.into()));
                }
                None => {
                    self.decode_line(&line)?;
                    break;
                }
            }
        }

        self.stage = Stage::Body;
        Ok(())
    }

    /// Decodes one radix-64 body line into the buffer.
    fn decode_line(&mut self, line: &str) -> io::Result<()> {
        let stripped: String =
            line.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if stripped.is_empty() {
            return Ok(());
        }

        let decoded = base64::decode_config(&stripped, base64::STANDARD)
            .map_err(|e| malformed(format!("Bad radix-64 line: {}", e)))?;
        self.crc.update(&decoded);
        self.buffer.extend_from_slice(&decoded);
        Ok(())
    }

    /// Consumes the optional CRC line and the footer line.
    ///
    /// `first` is the line that terminated the body (either the CRC
    /// line or the footer itself).
    fn finalize(&mut self, first: &str) -> io::Result<()> {
        let mut line = first.trim().to_string();

        // The CRC is optional.
        if let Some(encoded) = line.strip_prefix('=') {
            if encoded.len() != 4 {
                return Err(malformed("Invalid armor checksum line"));
            }
            let crc = base64::decode_config(encoded, base64::STANDARD_NO_PAD)
                .map_err(|e| malformed(format!("Bad armor checksum: {}", e)))?;
            let crc = (crc[0] as u32) << 16
                | (crc[1] as u32) << 8
                | crc[2] as u32;
            if crc != self.crc.finalize() {
                return Err(malformed("Armor checksum mismatch"));
            }

            line = loop {
                match self.next_line()? {
                    Some(l) if l.trim().is_empty() => continue,
                    Some(l) => break l.trim().to_string(),
                    None => return Err(malformed(
                        "Reached EOF looking for the armor footer")),
                }
            };
        }

        let kind = self.kind.expect("initialized in Stage::Body");
        if line != kind.end() {
            return Err(malformed("Invalid armor footer"));
        }

        self.stage = Stage::Done;
        Ok(())
    }
}

impl<'a> Read for Reader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.stage == Stage::Init {
            self.initialize()?;
        }

        while self.buffer.is_empty() && self.stage == Stage::Body {
            let line = self.next_line()?
                .ok_or_else(|| malformed("Truncated armor"))?;
            let trimmed = line.trim();
            if trimmed.starts_with('=') || trimmed.starts_with("-----") {
                self.finalize(trimmed)?;
            } else {
                self.decode_line(trimmed)?;
            }
        }

        let amount = std::cmp::min(buf.len(), self.buffer.len());
        buf[..amount].copy_from_slice(&self.buffer[..amount]);
        self.buffer.drain(..amount);
        Ok(amount)
    }
}

/// How many bytes of data a 64-character armor line encodes.
const LINE_BYTES: usize = 48;

/// A filter that applies ASCII armor to the data written to it.
pub struct Writer<W: Write> {
    sink: W,
    kind: Kind,
    stash: Vec<u8>,
    crc: CRC,
    begun: bool,
}

impl<W: Write> Writer<W> {
    /// Constructs a new filter for the given type of data.
    pub fn new(sink: W, kind: Kind) -> Self {
        Writer {
            sink,
            kind,
            stash: Vec::with_capacity(LINE_BYTES),
            crc: CRC::new(),
            begun: false,
        }
    }

    fn begin(&mut self) -> io::Result<()> {
        if !self.begun {
            writeln!(self.sink, "{}", self.kind.begin())?;
            writeln!(self.sink)?;
            self.begun = true;
        }
        Ok(())
    }

    /// Writes the remaining data, the checksum, and the footer, and
    /// returns the sink.
    pub fn finalize(mut self) -> io::Result<W> {
        self.begin()?;
        if !self.stash.is_empty() {
            writeln!(self.sink, "{}",
                     base64::encode_config(&self.stash, base64::STANDARD))?;
        }

        let crc = self.crc.finalize();
        let bytes = [(crc >> 16) as u8, (crc >> 8) as u8, crc as u8];
        writeln!(self.sink, "={}",
                 base64::encode_config(bytes, base64::STANDARD_NO_PAD))?;
        writeln!(self.sink, "{}", self.kind.end())?;
        Ok(self.sink)
    }
}

impl<W: Write> Write for Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.begin()?;
        self.crc.update(buf);
        self.stash.extend_from_slice(buf);
        while self.stash.len() >= LINE_BYTES {
            let rest = self.stash.split_off(LINE_BYTES);
            writeln!(self.sink, "{}",
                     base64::encode_config(&self.stash, base64::STANDARD))?;
            self.stash = rest;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}
