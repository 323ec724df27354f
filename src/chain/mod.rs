//! Ordered, cursor-driven view of a FLAC file's metadata blocks.
//!
//! [`MetadataChain`] is the seam between the block operations in
//! [`crate::ops`] and whatever owns the container.  The cursor model
//! follows libFLAC's metadata iterator:
//!
//! - A fresh chain has its cursor *before* the first block; `advance()`
//!   moves onto the next block and returns `false` once the end is reached.
//! - `insert_after()` places the new block after the cursor and moves the
//!   cursor onto it.
//! - `delete_current()` either swaps the block for PADDING of the same body
//!   length (cursor stays on the padding) or removes it outright (cursor
//!   steps back to the previous block).
//!
//! Only one traversal may be in flight per chain; insertion and deletion
//! mutate the cursor in place.

use crate::block::{MetadataBlock, BLOCK_HEADER_BYTES};

/// Largest body length a FLAC metadata block header can express (24 bits).
pub const MAX_BLOCK_BODY: usize = 0x00FF_FFFF;

pub trait MetadataChain {
    /// Step to the next block.  Returns `false`, leaving the cursor where it
    /// was, when there is no next block.
    fn advance(&mut self) -> bool;

    /// Block under the cursor, or `None` before the first `advance()`.
    fn current(&self) -> Option<&MetadataBlock>;

    /// Insert `block` after the cursor and move the cursor onto it.
    fn insert_after(&mut self, block: MetadataBlock);

    /// Remove the block under the cursor.  Returns `false` if there is none.
    fn delete_current(&mut self, replace_with_padding: bool) -> bool;

    /// Put the cursor back before the first block.
    fn rewind(&mut self);

    /// Move the cursor onto the last block.
    fn seek_end(&mut self) {
        while self.advance() {}
    }
}

// ── MemoryChain ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryChain {
    blocks: Vec<MetadataBlock>,
    /// `None` = before the first block.
    cursor: Option<usize>,
}

impl MemoryChain {
    pub fn new(blocks: Vec<MetadataBlock>) -> Self {
        Self { blocks, cursor: None }
    }

    pub fn blocks(&self) -> &[MetadataBlock] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<MetadataBlock> {
        self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Move every PADDING block to the end and merge them into one.
    ///
    /// The merged body absorbs the block headers of the padding blocks it
    /// replaces, so the total metadata size is unchanged.  A merged length
    /// beyond [`MAX_BLOCK_BODY`] is split across several blocks.  The cursor
    /// is rewound.
    pub fn sort_padding(&mut self) {
        let mut padding_blocks = 0usize;
        let mut padding_bytes  = 0usize;
        let mut kept = Vec::with_capacity(self.blocks.len());
        for block in self.blocks.drain(..) {
            match block {
                MetadataBlock::Padding(n) => {
                    padding_blocks += 1;
                    padding_bytes  += n as usize;
                }
                other => kept.push(other),
            }
        }
        if padding_blocks > 0 {
            let mut total = padding_bytes + (padding_blocks - 1) * BLOCK_HEADER_BYTES;
            while total > MAX_BLOCK_BODY {
                kept.push(MetadataBlock::Padding(MAX_BLOCK_BODY as u32));
                total -= MAX_BLOCK_BODY + BLOCK_HEADER_BYTES;
            }
            kept.push(MetadataBlock::Padding(total as u32));
        }
        self.blocks = kept;
        self.cursor = None;
    }
}

impl From<Vec<MetadataBlock>> for MemoryChain {
    fn from(blocks: Vec<MetadataBlock>) -> Self {
        Self::new(blocks)
    }
}

impl MetadataChain for MemoryChain {
    fn advance(&mut self) -> bool {
        let next = self.cursor.map_or(0, |c| c + 1);
        if next < self.blocks.len() {
            self.cursor = Some(next);
            true
        } else {
            false
        }
    }

    fn current(&self) -> Option<&MetadataBlock> {
        self.cursor.and_then(|c| self.blocks.get(c))
    }

    fn insert_after(&mut self, block: MetadataBlock) {
        let at = self.cursor.map_or(0, |c| c + 1);
        self.blocks.insert(at, block);
        self.cursor = Some(at);
    }

    fn delete_current(&mut self, replace_with_padding: bool) -> bool {
        let Some(c) = self.cursor else { return false };
        if replace_with_padding {
            let len = self.blocks[c].body_len() as u32;
            self.blocks[c] = MetadataBlock::Padding(len);
        } else {
            self.blocks.remove(c);
            self.cursor = c.checked_sub(1);
        }
        true
    }

    fn rewind(&mut self) {
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::ApplicationBlock;

    fn sample() -> MemoryChain {
        MemoryChain::new(vec![
            MetadataBlock::StreamInfo(vec![0; 34]),
            MetadataBlock::Padding(10),
            MetadataBlock::Application(ApplicationBlock::payload(vec![1, 2, 3])),
            MetadataBlock::Padding(20),
            MetadataBlock::VorbisComment(vec![9; 8]),
        ])
    }

    #[test]
    fn cursor_starts_before_first() {
        let mut chain = sample();
        assert!(chain.current().is_none());
        assert!(chain.advance());
        assert_eq!(chain.current().unwrap().kind(), crate::block::BlockKind::StreamInfo);
    }

    #[test]
    fn advance_stops_at_end() {
        let mut chain = sample();
        let mut n = 0;
        while chain.advance() { n += 1; }
        assert_eq!(n, 5);
        assert!(!chain.advance());
        assert!(matches!(chain.current(), Some(MetadataBlock::VorbisComment(_))));
    }

    #[test]
    fn insert_after_moves_cursor() {
        let mut chain = sample();
        chain.seek_end();
        chain.insert_after(MetadataBlock::Picture(vec![]));
        assert_eq!(chain.len(), 6);
        assert!(matches!(chain.current(), Some(MetadataBlock::Picture(_))));
        assert!(!chain.advance());
    }

    #[test]
    fn insert_into_empty_chain() {
        let mut chain = MemoryChain::default();
        chain.insert_after(MetadataBlock::Padding(1));
        assert_eq!(chain.blocks(), &[MetadataBlock::Padding(1)]);
    }

    #[test]
    fn delete_with_padding_keeps_size() {
        let mut chain = sample();
        chain.advance();
        chain.advance();
        chain.advance();
        assert!(chain.delete_current(true));
        assert_eq!(chain.current(), Some(&MetadataBlock::Padding(7)));
        assert_eq!(chain.len(), 5);
    }

    #[test]
    fn delete_without_padding_steps_back() {
        let mut chain = sample();
        chain.advance();
        chain.advance();
        assert!(chain.delete_current(false));
        assert!(matches!(chain.current(), Some(MetadataBlock::StreamInfo(_))));
        assert!(chain.advance());
        assert!(matches!(chain.current(), Some(MetadataBlock::Application(_))));
    }

    #[test]
    fn delete_before_first_is_noop() {
        let mut chain = sample();
        assert!(!chain.delete_current(true));
        assert_eq!(chain, sample());
    }

    #[test]
    fn sort_padding_merges_at_end() {
        let mut chain = sample();
        chain.sort_padding();
        let blocks = chain.blocks();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[3], MetadataBlock::Padding(10 + 20 + 4));
        assert!(matches!(blocks[2], MetadataBlock::VorbisComment(_)));
    }

    #[test]
    fn sort_padding_without_padding() {
        let mut chain = MemoryChain::new(vec![MetadataBlock::StreamInfo(vec![0; 34])]);
        chain.sort_padding();
        assert_eq!(chain.len(), 1);
    }
}
