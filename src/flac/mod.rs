//! FLAC file adapter: loads a file's metadata blocks into a [`MemoryChain`]
//! and writes the chain back.
//!
//! Bitstream parsing and the on-disk rewrite (including padding reuse and
//! preserving the audio frames) are delegated to the `metaflac` crate.
//! Blocks cross the boundary as raw `(type, body)` pairs so nothing this
//! crate does not understand is reinterpreted.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use metaflac::{Block, Tag};
use thiserror::Error;

use crate::block::{MetadataBlock, BLOCK_HEADER_BYTES};
use crate::chain::{MemoryChain, MAX_BLOCK_BODY};

#[derive(Error, Debug)]
pub enum FlacError {
    #[error("Can't read metadata from {path}: {source}")]
    Read { path: PathBuf, #[source] source: metaflac::Error },
    #[error("Can't write metadata chain to {path}: {source}")]
    Write { path: PathBuf, #[source] source: metaflac::Error },
    #[error("Can't convert {kind} block: {reason}")]
    Convert { kind: &'static str, reason: String },
}

/// One FLAC file opened for metadata editing.
pub struct FlacFile {
    path:  PathBuf,
    chain: MemoryChain,
}

impl FlacFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FlacError> {
        let path = path.as_ref().to_owned();
        let tag = Tag::read_from_path(&path)
            .map_err(|source| FlacError::Read { path: path.clone(), source })?;
        let blocks = tag
            .blocks()
            .map(from_flac_block)
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Read {} metadata block(s) from {}", blocks.len(), path.display());
        Ok(Self { path, chain: MemoryChain::new(blocks) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn chain(&self) -> &MemoryChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut MemoryChain {
        &mut self.chain
    }

    /// Write the chain back to the file, optionally consolidating padding at
    /// the end first.
    pub fn commit(mut self, sort_padding: bool) -> Result<(), FlacError> {
        if sort_padding {
            self.chain.sort_padding();
        }
        let write_err = |path: &Path, source: metaflac::Error| FlacError::Write { path: path.to_owned(), source };

        let mut tag = Tag::read_from_path(&self.path).map_err(|e| write_err(&self.path, e))?;
        let existing: Vec<_> = tag.blocks().map(|b| b.block_type()).collect();
        for block_type in existing {
            tag.remove_blocks(block_type);
        }
        let count = self.chain.len();
        for block in self.chain.into_blocks() {
            tag.push_block(to_flac_block(&block)?);
        }
        tag.save().map_err(|e| write_err(&self.path, e))?;
        debug!("Wrote {count} metadata block(s) to {}", self.path.display());
        Ok(())
    }
}

/// Serialise a `metaflac` block and reparse it as a [`MetadataBlock`].
pub fn from_flac_block(block: &Block) -> Result<MetadataBlock, FlacError> {
    let convert = |reason: String| FlacError::Convert { kind: "FLAC", reason };

    let mut raw = Vec::new();
    block.write_to(false, &mut raw).map_err(|e| convert(e.to_string()))?;
    let mut cursor = Cursor::new(&raw);
    let header = cursor.read_u32::<BigEndian>().map_err(|e| convert(e.to_string()))?;
    let code = ((header >> 24) & 0x7F) as u8;
    let len  = (header & 0x00FF_FFFF) as usize;
    let body = raw
        .get(BLOCK_HEADER_BYTES..BLOCK_HEADER_BYTES + len)
        .ok_or_else(|| convert(format!("block body shorter than its {len}-byte header length")))?
        .to_vec();
    Ok(MetadataBlock::from_raw(code, body))
}

/// Frame a [`MetadataBlock`] and hand it to `metaflac` to parse.
pub fn to_flac_block(block: &MetadataBlock) -> Result<Block, FlacError> {
    let kind = block.kind().name();
    let convert = |reason: String| FlacError::Convert { kind, reason };

    let (code, body) = block.to_raw();
    if body.len() > MAX_BLOCK_BODY {
        return Err(convert(format!("{} byte body exceeds the {MAX_BLOCK_BODY} byte limit", body.len())));
    }
    let mut raw = Vec::with_capacity(BLOCK_HEADER_BYTES + body.len());
    raw.write_u32::<BigEndian>(((code as u32 & 0x7F) << 24) | body.len() as u32)
        .map_err(|e| convert(e.to_string()))?;
    raw.extend_from_slice(&body);
    let (_, _, parsed) = Block::read_from(&mut Cursor::new(raw)).map_err(|e| convert(e.to_string()))?;
    Ok(parsed)
}
