//! Operations over a chain of metadata blocks: search, delete, smallest-image
//! selection and import.
//!
//! Every operation rewinds the chain, then walks it forward once.  Blocks
//! that are not ours are skipped.  A block that is ours but cannot be
//! decoded is logged and reported as a [`BlockFault`]; the walk carries on.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use crate::block::{is_payload_block, ApplicationBlock, MetadataBlock, PayloadBlock, ID_BYTES};
use crate::chain::{MetadataChain, MAX_BLOCK_BODY};
use crate::header::{HeaderError, PayloadHeader, HEADER_SIZE};
use crate::mime;

/// Label prefix a block must carry to be a thumbnail candidate.
pub const IMAGE_LABEL_PREFIX: &str = "image/";

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Can't read image file {path}: {source}")]
    SourceUnreadable { path: PathBuf, #[source] source: io::Error },
    #[error("Short read trying to load image: expected {expected} bytes, got {actual}")]
    ShortRead { expected: u64, actual: usize },
    #[error("Image of {len} bytes does not fit in a FLAC metadata block")]
    TooLarge { len: u64 },
}

/// A recognised block that survived filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadMatch {
    /// Zero-based position of the block in the chain.
    pub position: usize,
    pub header:   PayloadHeader,
    pub block:    ApplicationBlock,
}

impl PayloadMatch {
    /// The payload bytes, bounds-checked against the block length.
    pub fn payload(&self) -> Result<&[u8], HeaderError> {
        self.header.payload(&self.block.data)
    }
}

/// A block that is ours but could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFault {
    pub position: usize,
    pub error:    HeaderError,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub matches: Vec<PayloadMatch>,
    pub faults:  Vec<BlockFault>,
}

impl SearchResult {
    pub fn count(&self) -> usize {
        self.matches.len()
    }
}

// ── Traversal ────────────────────────────────────────────────────────────────

/// Walk `chain` from the start, handing every decodable payload block and its
/// position to `visit`.  Undecodable payload blocks go to `faults`.
fn walk<C, F>(chain: &mut C, faults: &mut Vec<BlockFault>, mut visit: F)
where
    C: MetadataChain + ?Sized,
    F: FnMut(usize, PayloadBlock<'_>),
{
    chain.rewind();
    let mut position = 0usize;
    while chain.advance() {
        if let Some(block) = chain.current() {
            match PayloadBlock::classify(block) {
                Ok(Some(payload)) => visit(position, payload),
                Ok(None) => debug!("Skipping {} block at {position}", block.kind().name()),
                Err(error) => {
                    warn!("Unreadable image block at {position}: {error}");
                    faults.push(BlockFault { position, error });
                }
            }
        }
        position += 1;
    }
}

fn filter_accepts(header: &PayloadHeader, label_filter: Option<&str>) -> bool {
    label_filter.map_or(true, |f| header.label_matches(f))
}

// ── Operations ───────────────────────────────────────────────────────────────

/// Every payload block whose label starts with `label_filter` (all of them
/// when `None`), in chain order.
pub fn search<C>(chain: &mut C, label_filter: Option<&str>) -> SearchResult
where
    C: MetadataChain + ?Sized,
{
    let mut result = SearchResult::default();
    let mut matches = Vec::new();
    walk(chain, &mut result.faults, |position, payload| {
        if filter_accepts(&payload.header, label_filter) {
            matches.push(PayloadMatch {
                position,
                header: payload.header,
                block:  payload.block.clone(),
            });
        }
    });
    result.matches = matches;
    result
}

/// Replace every matching payload block with PADDING of the same length.
/// Returns the number of blocks removed.
///
/// Without a filter every payload block goes, decodable or not.  With a
/// filter, blocks whose header cannot be read are left alone.
pub fn delete_matching<C>(chain: &mut C, label_filter: Option<&str>) -> usize
where
    C: MetadataChain + ?Sized,
{
    chain.rewind();
    let mut count = 0usize;
    while chain.advance() {
        let Some(block) = chain.current() else { continue };
        if !is_payload_block(block) {
            continue;
        }
        if let Some(filter) = label_filter {
            let app = match block.as_application() {
                Some(app) => app,
                None => continue,
            };
            match PayloadHeader::decode(&app.data) {
                Ok(header) if header.label_matches(filter) => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!("Leaving unreadable image block in place: {e}");
                    continue;
                }
            }
        }
        if chain.delete_current(true) {
            count += 1;
        }
    }
    info!("Deleted {count} block(s)");
    count
}

/// The payload block with the smallest `payload_size` among those labelled
/// `image/...`.  Ties go to the earliest block.  No upper size bound applies.
pub fn select_smallest<C>(chain: &mut C) -> (Option<PayloadMatch>, Vec<BlockFault>)
where
    C: MetadataChain + ?Sized,
{
    let mut faults = Vec::new();
    let mut smallest: Option<PayloadMatch> = None;
    walk(chain, &mut faults, |position, payload| {
        if !payload.header.label_matches(IMAGE_LABEL_PREFIX) {
            return;
        }
        let better = smallest
            .as_ref()
            .map_or(true, |s| payload.header.payload_size < s.header.payload_size);
        if better {
            smallest = Some(PayloadMatch {
                position,
                header: payload.header,
                block:  payload.block.clone(),
            });
        }
    });
    (smallest, faults)
}

/// Header followed by the first `payload_size` bytes of `source`.
///
/// Fails with [`ImportError::ShortRead`] when `source` holds fewer bytes
/// than `payload_size`.
pub fn build_insertable(
    source:        &[u8],
    mime_label:    &str,
    filename_hint: &str,
    payload_size:  u32,
) -> Result<Vec<u8>, ImportError> {
    let wanted = payload_size as usize;
    if source.len() < wanted {
        return Err(ImportError::ShortRead { expected: payload_size as u64, actual: source.len() });
    }
    let header = PayloadHeader::new(mime_label, filename_hint, payload_size);
    let mut data = Vec::with_capacity(HEADER_SIZE + wanted);
    data.extend_from_slice(&header.encode());
    data.extend_from_slice(&source[..wanted]);
    Ok(data)
}

/// What [`import_file`] inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Imported {
    pub header:    PayloadHeader,
    /// Bytes of block data (header plus payload), excluding the id.
    pub block_len: usize,
}

/// Read `path` and append it to the end of `chain` as a new payload block.
///
/// The label defaults to [`mime::guess`] on the path.
pub fn import_file<C>(chain: &mut C, path: &Path, mime_label: Option<&str>) -> Result<Imported, ImportError>
where
    C: MetadataChain + ?Sized,
{
    let unreadable = |source: io::Error| ImportError::SourceUnreadable { path: path.to_owned(), source };

    let size = fs::metadata(path).map_err(unreadable)?.len();
    let block_len = HEADER_SIZE as u64 + size;
    if block_len + ID_BYTES as u64 > MAX_BLOCK_BODY as u64 {
        return Err(ImportError::TooLarge { len: size });
    }
    let source = fs::read(path).map_err(unreadable)?;

    let name  = path.to_string_lossy();
    let label = mime_label.unwrap_or_else(|| mime::guess(&name));
    let data  = build_insertable(&source, label, &name, size as u32)?;
    let header = PayloadHeader::new(label, &name, size as u32);

    chain.seek_end();
    let block_len = data.len();
    chain.insert_after(MetadataBlock::Application(ApplicationBlock::payload(data)));
    info!("Inserted block with mime-type {}: {block_len} bytes", header.mime_label_lossy());
    Ok(Imported { header, block_len })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryChain;
    use crate::header::{encode, HEADER_VERSION};

    fn payload(label: &str, size: u32) -> MetadataBlock {
        let mut data = encode(HEADER_VERSION, label, "f.bin", size).to_vec();
        data.resize(HEADER_SIZE + size as usize, 0x5A);
        MetadataBlock::Application(ApplicationBlock::payload(data))
    }

    fn foreign(label: &str, size: u32) -> MetadataBlock {
        let mut data = encode(HEADER_VERSION, label, "f.bin", size).to_vec();
        data.resize(HEADER_SIZE + size as usize, 0);
        MetadataBlock::Application(ApplicationBlock::new(*b"xmcd", data))
    }

    fn chain(blocks: Vec<MetadataBlock>) -> MemoryChain {
        let mut all = vec![MetadataBlock::StreamInfo(vec![0; 34])];
        all.extend(blocks);
        MemoryChain::new(all)
    }

    #[test]
    fn search_filters_by_prefix() {
        let mut c = chain(vec![
            payload("image/png", 1),
            payload("images", 2),
            payload("text/plain", 3),
            foreign("image/png", 4),
        ]);
        let all = search(&mut c, None);
        assert_eq!(all.count(), 3);
        let images = search(&mut c, Some("image"));
        let sizes: Vec<u32> = images.matches.iter().map(|m| m.header.payload_size).collect();
        assert_eq!(sizes, vec![1, 2]);
        assert_eq!(images.matches[0].position, 1);
    }

    #[test]
    fn search_isolates_malformed_blocks() {
        let mut c = chain(vec![
            MetadataBlock::Application(ApplicationBlock::payload(vec![0; 10])),
            payload("image/gif", 5),
        ]);
        let result = search(&mut c, None);
        assert_eq!(result.count(), 1);
        assert_eq!(result.faults, vec![BlockFault {
            position: 1,
            error:    HeaderError::MalformedHeader { len: 10 },
        }]);
    }

    #[test]
    fn delete_counts_and_pads() {
        let mut c = chain(vec![
            payload("image/gif", 1),
            payload("image/png", 2),
            foreign("image/gif", 3),
            payload("image/gif", 4),
            payload("image/jpeg", 5),
            payload("text/plain", 6),
        ]);
        assert_eq!(delete_matching(&mut c, Some("image/gif")), 2);
        assert_eq!(c.blocks()[1], MetadataBlock::Padding((ID_BYTES + HEADER_SIZE + 1) as u32));
        assert_eq!(c.blocks()[4], MetadataBlock::Padding((ID_BYTES + HEADER_SIZE + 4) as u32));
        let left = search(&mut c, None);
        let labels: Vec<_> = left.matches.iter().map(|m| m.header.mime_label_lossy().into_owned()).collect();
        assert_eq!(labels, vec!["image/png", "image/jpeg", "text/plain"]);
        assert!(matches!(&c.blocks()[3], MetadataBlock::Application(a) if !a.is_ours()));
    }

    #[test]
    fn delete_without_filter_takes_malformed_too() {
        let mut c = chain(vec![
            MetadataBlock::Application(ApplicationBlock::payload(vec![0; 10])),
            payload("image/gif", 1),
        ]);
        assert_eq!(delete_matching(&mut c, None), 2);
        assert_eq!(search(&mut c, None).count(), 0);
    }

    #[test]
    fn smallest_picks_minimum() {
        let mut c = chain(vec![
            payload("image/jpeg", 500),
            payload("image/jpeg", 2000),
            payload("text/plain", 10),
            payload("image/jpeg", 100),
        ]);
        let (best, faults) = select_smallest(&mut c);
        assert!(faults.is_empty());
        let best = best.unwrap();
        assert_eq!(best.header.payload_size, 100);
        assert_eq!(best.position, 4);
    }

    #[test]
    fn smallest_ties_keep_first() {
        let mut c = chain(vec![payload("image/png", 7), payload("image/gif", 7)]);
        let best = select_smallest(&mut c).0.unwrap();
        assert_eq!(best.header.mime_label, b"image/png");
    }

    #[test]
    fn smallest_none_without_candidates() {
        let mut c = chain(vec![payload("images", 1), foreign("image/png", 1)]);
        assert!(select_smallest(&mut c).0.is_none());
        assert!(select_smallest(&mut MemoryChain::default()).0.is_none());
    }

    #[test]
    fn smallest_has_no_size_ceiling() {
        let big = 10 * 1024 * 1024 + 1;
        let mut data = encode(HEADER_VERSION, "image/png", "huge.png", big).to_vec();
        data.truncate(HEADER_SIZE);
        let mut c = chain(vec![MetadataBlock::Application(ApplicationBlock::payload(data))]);
        let best = select_smallest(&mut c).0.unwrap();
        assert_eq!(best.header.payload_size, big);
        assert!(best.payload().is_err());
    }

    #[test]
    fn build_insertable_layout() {
        let data = build_insertable(b"PNGDATA", "image/png", "/tmp/art/front.png", 7).unwrap();
        assert_eq!(data.len(), HEADER_SIZE + 7);
        let h = PayloadHeader::decode(&data).unwrap();
        assert_eq!(h.filename, b"front.png");
        assert_eq!(h.payload(&data).unwrap(), b"PNGDATA");
    }

    #[test]
    fn build_insertable_short_source() {
        assert!(matches!(
            build_insertable(b"abc", "image/png", "a.png", 10),
            Err(ImportError::ShortRead { expected: 10, actual: 3 })
        ));
    }

    #[test]
    fn import_appends_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.JPG");
        fs::write(&path, b"\xFF\xD8jpeg").unwrap();

        let mut c = chain(vec![payload("image/png", 1), MetadataBlock::Padding(64)]);
        let imported = import_file(&mut c, &path, None).unwrap();
        assert_eq!(imported.header.mime_label, b"image/jpeg");
        assert_eq!(imported.header.filename, b"cover.JPG");
        assert_eq!(imported.block_len, HEADER_SIZE + 6);
        assert_eq!(c.len(), 4);
        let last = search(&mut c, Some("image/jpeg"));
        assert_eq!(last.matches[0].position, 3);
        assert_eq!(last.matches[0].payload().unwrap(), b"\xFF\xD8jpeg");
    }

    #[test]
    fn import_explicit_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("booklet.pdf");
        fs::write(&path, b"%PDF").unwrap();
        let mut c = chain(vec![]);
        let imported = import_file(&mut c, &path, Some("application/pdf")).unwrap();
        assert_eq!(imported.header.mime_label, b"application/pdf");
    }

    #[test]
    fn import_missing_source() {
        let mut c = chain(vec![]);
        let err = import_file(&mut c, Path::new("/nonexistent/cover.png"), None).unwrap_err();
        assert!(matches!(err, ImportError::SourceUnreadable { .. }));
        assert_eq!(c.len(), 1);
    }
}
