//! Fixed-size payload header stored at the front of every `imag` block.
//!
//! # Layout
//!
//! | offset | size | field |
//! |-------:|-----:|-------|
//! | 0  | 4  | `version` (u32 LE, currently `1`) |
//! | 4  | 32 | `mime_label`, NUL-terminated, zero-padded |
//! | 36 | 32 | `filename`, NUL-terminated, zero-padded |
//! | 68 | 4  | `payload_size` (u32 LE) |
//!
//! The payload bytes follow immediately after offset 72.
//!
//! Text fields hold at most 31 bytes of text; longer input is truncated so
//! the terminator always fits.  Encoding never fails.  Decoded text fields
//! are kept as the raw stored bytes, which need not be UTF-8.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::borrow::Cow;
use std::io::{self, Read, Write};
use thiserror::Error;

/// The only header version defined so far.
pub const HEADER_VERSION: u32 = 1;
/// Size of the encoded header in bytes.
pub const HEADER_SIZE: usize = 72;
/// Capacity of the label field, terminator included.
pub const LABEL_CAPACITY: usize = 32;
/// Capacity of the filename field, terminator included.
pub const FILENAME_CAPACITY: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Malformed header: {len} bytes, need at least {HEADER_SIZE}")]
    MalformedHeader { len: usize },
    #[error("Payload size {declared} exceeds the {available} bytes present in the block")]
    PayloadOutOfRange { declared: u32, available: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadHeader {
    pub version:      u32,
    /// Stored label bytes, terminator stripped.
    pub mime_label:   Vec<u8>,
    /// Stored filename bytes, terminator stripped.
    pub filename:     Vec<u8>,
    pub payload_size: u32,
}

impl PayloadHeader {
    /// Build a current-version header.  `source_name` is reduced to its final
    /// `/`-separated segment, and both text fields are truncated to fit.
    pub fn new(mime_label: &str, source_name: &str, payload_size: u32) -> Self {
        Self {
            version:      HEADER_VERSION,
            mime_label:   truncate_field(mime_label.to_owned(), LABEL_CAPACITY).into_bytes(),
            filename:     truncate_field(final_segment(source_name).to_owned(), FILENAME_CAPACITY).into_bytes(),
            payload_size,
        }
    }

    pub fn is_current_version(&self) -> bool {
        self.version == HEADER_VERSION
    }

    /// The label for display; invalid UTF-8 shows as U+FFFD.
    pub fn mime_label_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.mime_label)
    }

    /// The filename for display; invalid UTF-8 shows as U+FFFD.
    pub fn filename_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.filename)
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        // A 72-byte slice always has room for the 72-byte header.
        let _ = self.write(&mut out[..]);
        out
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_all(&encode_text_field::<LABEL_CAPACITY>(&self.mime_label))?;
        writer.write_all(&encode_text_field::<FILENAME_CAPACITY>(&self.filename))?;
        writer.write_u32::<LittleEndian>(self.payload_size)?;
        Ok(())
    }

    /// Reinterpret the first [`HEADER_SIZE`] bytes of `bytes` as a header.
    ///
    /// `payload_size` is taken as stored; it is not checked against the
    /// length of `bytes`.  See [`PayloadHeader::payload`] for the checked
    /// accessor.
    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < HEADER_SIZE {
            return Err(HeaderError::MalformedHeader { len: bytes.len() });
        }
        Self::read(&bytes[..HEADER_SIZE])
            .map_err(|_| HeaderError::MalformedHeader { len: bytes.len() })
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let version = reader.read_u32::<LittleEndian>()?;
        let mut label = [0u8; LABEL_CAPACITY];
        reader.read_exact(&mut label)?;
        let mut filename = [0u8; FILENAME_CAPACITY];
        reader.read_exact(&mut filename)?;
        let payload_size = reader.read_u32::<LittleEndian>()?;
        Ok(Self {
            version,
            mime_label: decode_text_field(&label).to_vec(),
            filename:   decode_text_field(&filename).to_vec(),
            payload_size,
        })
    }

    /// The `payload_size` bytes following the header in `block_data`.
    ///
    /// Fails with [`HeaderError::PayloadOutOfRange`] when the stored size
    /// runs past the end of the block.
    pub fn payload<'a>(&self, block_data: &'a [u8]) -> Result<&'a [u8], HeaderError> {
        let available = block_data.len().saturating_sub(HEADER_SIZE);
        let declared  = self.payload_size as usize;
        if declared > available {
            return Err(HeaderError::PayloadOutOfRange { declared: self.payload_size, available });
        }
        Ok(&block_data[HEADER_SIZE..HEADER_SIZE + declared])
    }

    /// True when the label starts with `filter`, compared byte-wise over the
    /// length of the filter.  `"image"` matches both `"image/png"` and
    /// `"images"`.
    pub fn label_matches(&self, filter: &str) -> bool {
        self.mime_label.starts_with(filter.as_bytes())
    }
}

/// Encode a header from its raw fields.
pub fn encode(version: u32, mime_label: &str, original_filename: &str, payload_size: u32) -> [u8; HEADER_SIZE] {
    let mut header = PayloadHeader::new(mime_label, original_filename, payload_size);
    header.version = version;
    header.encode()
}

pub fn decode(bytes: &[u8]) -> Result<PayloadHeader, HeaderError> {
    PayloadHeader::decode(bytes)
}

/// Everything after the final `/`, or the whole name when there is none.
pub fn final_segment(name: &str) -> &str {
    match name.rfind('/') {
        Some(pos) => &name[pos + 1..],
        None      => name,
    }
}

/// Shorten `text` to at most `capacity - 1` bytes, backing off to a char
/// boundary.  Stops at an interior NUL since nothing past it survives decode.
fn truncate_field(mut text: String, capacity: usize) -> String {
    if let Some(nul) = text.find('\0') {
        text.truncate(nul);
    }
    let mut end = text.len().min(capacity - 1);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text
}

/// Zero-filled fixed field holding `text` up to its first NUL, cut to
/// `N - 1` bytes.
fn encode_text_field<const N: usize>(text: &[u8]) -> [u8; N] {
    let text = decode_text_field(text);
    let len = text.len().min(N - 1);
    let mut field = [0u8; N];
    field[..len].copy_from_slice(&text[..len]);
    field
}

fn decode_text_field(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}
