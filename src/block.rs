//! FLAC metadata blocks as seen by this crate, and the `imag` classifier.
//!
//! Every block kind FLAC defines gets its own variant so callers can match
//! on it, but only [`MetadataBlock::Application`] carries structure here;
//! the other bodies are opaque bytes passed through untouched.

use log::debug;

use crate::header::{HeaderError, PayloadHeader, HEADER_VERSION};

/// Application id claimed by this crate: ASCII `imag` (0x696d6167).
pub const APPLICATION_ID: [u8; 4] = *b"imag";
/// Bytes taken by the application id at the front of an APPLICATION body.
pub const ID_BYTES: usize = 4;
/// Size of the FLAC metadata block header preceding every block body.
pub const BLOCK_HEADER_BYTES: usize = 4;

// ── BlockKind ────────────────────────────────────────────────────────────────

/// FLAC metadata block type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    Reserved(u8),
}

impl BlockKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => BlockKind::StreamInfo,
            1 => BlockKind::Padding,
            2 => BlockKind::Application,
            3 => BlockKind::SeekTable,
            4 => BlockKind::VorbisComment,
            5 => BlockKind::CueSheet,
            6 => BlockKind::Picture,
            n => BlockKind::Reserved(n),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            BlockKind::StreamInfo    => 0,
            BlockKind::Padding       => 1,
            BlockKind::Application   => 2,
            BlockKind::SeekTable     => 3,
            BlockKind::VorbisComment => 4,
            BlockKind::CueSheet      => 5,
            BlockKind::Picture       => 6,
            BlockKind::Reserved(n)   => n,
        }
    }

    /// Upper-case name as printed by `metaflac --list`.
    pub fn name(self) -> &'static str {
        match self {
            BlockKind::StreamInfo    => "STREAMINFO",
            BlockKind::Padding       => "PADDING",
            BlockKind::Application   => "APPLICATION",
            BlockKind::SeekTable     => "SEEKTABLE",
            BlockKind::VorbisComment => "VORBIS_COMMENT",
            BlockKind::CueSheet      => "CUESHEET",
            BlockKind::Picture       => "PICTURE",
            BlockKind::Reserved(_)   => "RESERVED",
        }
    }
}

// ── ApplicationBlock ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationBlock {
    pub id:   [u8; 4],
    pub data: Vec<u8>,
}

impl ApplicationBlock {
    pub fn new(id: [u8; 4], data: Vec<u8>) -> Self {
        Self { id, data }
    }

    /// An application block tagged with [`APPLICATION_ID`].
    pub fn payload(data: Vec<u8>) -> Self {
        Self::new(APPLICATION_ID, data)
    }

    pub fn is_ours(&self) -> bool {
        self.id == APPLICATION_ID
    }
}

// ── MetadataBlock ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataBlock {
    StreamInfo(Vec<u8>),
    /// Filler of the given body length.
    Padding(u32),
    Application(ApplicationBlock),
    SeekTable(Vec<u8>),
    VorbisComment(Vec<u8>),
    CueSheet(Vec<u8>),
    Picture(Vec<u8>),
    /// Reserved type codes, and APPLICATION bodies too short to hold an id.
    Reserved { code: u8, body: Vec<u8> },
}

impl MetadataBlock {
    pub fn kind(&self) -> BlockKind {
        match self {
            MetadataBlock::StreamInfo(_)       => BlockKind::StreamInfo,
            MetadataBlock::Padding(_)          => BlockKind::Padding,
            MetadataBlock::Application(_)      => BlockKind::Application,
            MetadataBlock::SeekTable(_)        => BlockKind::SeekTable,
            MetadataBlock::VorbisComment(_)    => BlockKind::VorbisComment,
            MetadataBlock::CueSheet(_)         => BlockKind::CueSheet,
            MetadataBlock::Picture(_)          => BlockKind::Picture,
            MetadataBlock::Reserved { code, .. } => BlockKind::from_code(*code),
        }
    }

    /// Length of the block body, excluding the 4-byte block header.
    pub fn body_len(&self) -> usize {
        match self {
            MetadataBlock::Padding(n)      => *n as usize,
            MetadataBlock::Application(a)  => ID_BYTES + a.data.len(),
            MetadataBlock::StreamInfo(b)
            | MetadataBlock::SeekTable(b)
            | MetadataBlock::VorbisComment(b)
            | MetadataBlock::CueSheet(b)
            | MetadataBlock::Picture(b)
            | MetadataBlock::Reserved { body: b, .. } => b.len(),
        }
    }

    /// Build a block from its type code and raw body.
    pub fn from_raw(code: u8, body: Vec<u8>) -> Self {
        match BlockKind::from_code(code) {
            BlockKind::StreamInfo    => MetadataBlock::StreamInfo(body),
            BlockKind::Padding       => MetadataBlock::Padding(body.len() as u32),
            BlockKind::Application if body.len() >= ID_BYTES => {
                let mut id = [0u8; ID_BYTES];
                id.copy_from_slice(&body[..ID_BYTES]);
                MetadataBlock::Application(ApplicationBlock::new(id, body[ID_BYTES..].to_vec()))
            }
            BlockKind::SeekTable     => MetadataBlock::SeekTable(body),
            BlockKind::VorbisComment => MetadataBlock::VorbisComment(body),
            BlockKind::CueSheet      => MetadataBlock::CueSheet(body),
            BlockKind::Picture       => MetadataBlock::Picture(body),
            BlockKind::Application | BlockKind::Reserved(_) => MetadataBlock::Reserved { code, body },
        }
    }

    /// Type code and raw body, the inverse of [`MetadataBlock::from_raw`].
    pub fn to_raw(&self) -> (u8, Vec<u8>) {
        let body = match self {
            MetadataBlock::Padding(n) => vec![0u8; *n as usize],
            MetadataBlock::Application(a) => {
                let mut body = Vec::with_capacity(ID_BYTES + a.data.len());
                body.extend_from_slice(&a.id);
                body.extend_from_slice(&a.data);
                body
            }
            MetadataBlock::StreamInfo(b)
            | MetadataBlock::SeekTable(b)
            | MetadataBlock::VorbisComment(b)
            | MetadataBlock::CueSheet(b)
            | MetadataBlock::Picture(b)
            | MetadataBlock::Reserved { body: b, .. } => b.clone(),
        };
        (self.kind().code(), body)
    }

    pub fn as_application(&self) -> Option<&ApplicationBlock> {
        match self {
            MetadataBlock::Application(a) => Some(a),
            _ => None,
        }
    }
}

// ── Classifier ───────────────────────────────────────────────────────────────

/// True iff `block` is an APPLICATION block carrying [`APPLICATION_ID`].
///
/// A recognised block whose header version is not [`HEADER_VERSION`] is
/// still claimed; the mismatch is only noted at debug level.
pub fn is_payload_block(block: &MetadataBlock) -> bool {
    let app = match block.as_application() {
        Some(app) if app.is_ours() => app,
        _ => return false,
    };
    if let Ok(header) = PayloadHeader::decode(&app.data) {
        if !header.is_current_version() {
            debug!("Image block has mismatched version stamp {} (expected {HEADER_VERSION})", header.version);
        }
    }
    true
}

/// A recognised payload block with its decoded header.
#[derive(Debug, Clone)]
pub struct PayloadBlock<'a> {
    pub header: PayloadHeader,
    pub block:  &'a ApplicationBlock,
}

impl<'a> PayloadBlock<'a> {
    /// `Ok(None)` for foreign blocks; `Err` when ours but too short to decode.
    pub fn classify(block: &'a MetadataBlock) -> Result<Option<Self>, HeaderError> {
        if !is_payload_block(block) {
            return Ok(None);
        }
        match block.as_application() {
            Some(app) => Ok(Some(Self { header: PayloadHeader::decode(&app.data)?, block: app })),
            None      => Ok(None),
        }
    }
}
