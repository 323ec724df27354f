//! High-level per-file driver, the primary embedding surface.
//!
//! ```no_run
//! use flac_image::session::{run, Operation, Options};
//!
//! // Add cover art, guessing the label from the extension.
//! run("album.flac", &Operation::Import { source: "cover.jpg".into(), label: None }, &Options::default())?;
//!
//! // Pull out the smallest image into the current directory.
//! let report = run("album.flac", &Operation::ExportSmallest, &Options::default())?;
//! for path in &report.extracted {
//!     println!("wrote {}", path.display());
//! }
//! # Ok::<(), flac_image::session::Error>(())
//! ```

use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::chain::MetadataChain;
use crate::extract::{extract_block, ExtractError};
use crate::flac::{FlacError, FlacFile};
use crate::header::HeaderError;
use crate::ops::{self, BlockFault, ImportError, Imported, PayloadMatch};

// ── Operation / Options ──────────────────────────────────────────────────────

/// The one thing to do to each file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Append `source` as a new block.  `label` overrides the guessed one.
    Import { source: PathBuf, label: Option<String> },
    /// Extract every matching block.
    ExportAll,
    /// Delete every matching block.
    Delete,
    /// Extract only the smallest `image/...` block.
    ExportSmallest,
    /// List matching blocks.
    List,
}

impl Operation {
    pub fn mutates(&self) -> bool {
        matches!(self, Operation::Import { .. } | Operation::Delete)
    }
}

/// Configuration shared by every file in a run.
#[derive(Debug, Clone)]
pub struct Options {
    /// Restrict export/delete/list to labels with this byte prefix.
    pub label_filter: Option<String>,
    /// Directory extracted files are written into.
    pub output_dir:   PathBuf,
    /// Move and merge padding to the end before writing back.
    pub sort_padding: bool,
    /// Run the operation but never write the file back.
    pub dry_run:      bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            label_filter: None,
            output_dir:   PathBuf::from("."),
            sort_padding: true,
            dry_run:      false,
        }
    }
}

// ── Report ───────────────────────────────────────────────────────────────────

/// Descriptor of one recognised block, as shown by `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    pub position:     usize,
    pub version:      u32,
    /// Label and filename as text; bytes that are not UTF-8 show as U+FFFD.
    pub mime_label:   String,
    pub filename:     String,
    pub payload_size: u32,
    /// First 6 bytes of the payload's BLAKE3 hash, hex; `None` when the
    /// stored size runs past the block.
    pub fingerprint:  Option<String>,
}

impl From<&PayloadMatch> for BlockInfo {
    fn from(m: &PayloadMatch) -> Self {
        BlockInfo {
            position:     m.position,
            version:      m.header.version,
            mime_label:   m.header.mime_label_lossy().into_owned(),
            filename:     m.header.filename_lossy().into_owned(),
            payload_size: m.header.payload_size,
            fingerprint:  m.payload().ok().map(|p| hex::encode(&blake3::hash(p).as_bytes()[..6])),
        }
    }
}

/// Something went wrong with one block, but the rest of the file was still
/// processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    #[error("Image block at {position} has mismatched version stamp {version}")]
    VersionMismatch { position: usize, version: u32 },
    #[error("Unreadable image block at {position}: {error}")]
    UnreadableBlock { position: usize, error: HeaderError },
    #[error("Won't extract to filename containing path characters: {filename:?}")]
    UnsafePath { filename: String },
    #[error("Can't extract block at {position}: {reason}")]
    ExtractFailed { position: usize, reason: String },
    #[error("Short write to {}: {written} of {expected} bytes", .path.display())]
    ShortWrite { path: PathBuf, written: usize, expected: usize },
}

impl From<BlockFault> for Warning {
    fn from(f: BlockFault) -> Self {
        Warning::UnreadableBlock { position: f.position, error: f.error }
    }
}

/// What happened to one file.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub path:      PathBuf,
    /// Blocks matched by list / export / thumbnail.
    pub found:     Vec<BlockInfo>,
    pub extracted: Vec<PathBuf>,
    pub deleted:   usize,
    pub imported:  Option<Imported>,
    pub warnings:  Vec<Warning>,
    pub committed: bool,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Flac(#[from] FlacError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("No image blocks found.")]
    NoImageBlocks,
}

// ── Driver ───────────────────────────────────────────────────────────────────

/// Open `path`, apply `op`, and write the file back if `op` changed it.
pub fn run<P: AsRef<Path>>(path: P, op: &Operation, opts: &Options) -> Result<Report, Error> {
    let mut file = FlacFile::open(path.as_ref())?;
    let mut report = run_on_chain(file.chain_mut(), op, opts)?;
    report.path = file.path().to_owned();

    if op.mutates() && !opts.dry_run {
        file.commit(opts.sort_padding)?;
        report.committed = true;
    }
    Ok(report)
}

/// Apply `op` to an already-loaded chain.  Never commits.
pub fn run_on_chain<C>(chain: &mut C, op: &Operation, opts: &Options) -> Result<Report, Error>
where
    C: MetadataChain + ?Sized,
{
    let filter = opts.label_filter.as_deref();
    let mut report = Report::default();

    match op {
        Operation::Import { source, label } => {
            report.imported = Some(ops::import_file(chain, source, label.as_deref())?);
        }
        Operation::Delete => {
            report.deleted = ops::delete_matching(chain, filter);
        }
        Operation::List => {
            let result = ops::search(chain, filter);
            report.warnings.extend(result.faults.into_iter().map(Warning::from));
            record_found(&mut report, &result.matches);
        }
        Operation::ExportAll => {
            let result = ops::search(chain, filter);
            report.warnings.extend(result.faults.into_iter().map(Warning::from));
            record_found(&mut report, &result.matches);
            for m in &result.matches {
                export_one(&mut report, m, &opts.output_dir);
            }
        }
        Operation::ExportSmallest => {
            let (smallest, faults) = ops::select_smallest(chain);
            report.warnings.extend(faults.into_iter().map(Warning::from));
            let m = smallest.ok_or(Error::NoImageBlocks)?;
            record_found(&mut report, std::slice::from_ref(&m));
            export_one(&mut report, &m, &opts.output_dir);
        }
    }
    Ok(report)
}

fn record_found(report: &mut Report, matches: &[PayloadMatch]) {
    for m in matches {
        if !m.header.is_current_version() {
            report.warnings.push(Warning::VersionMismatch {
                position: m.position,
                version:  m.header.version,
            });
        }
        report.found.push(BlockInfo::from(m));
    }
}

/// Extract one block, turning every failure into a warning so the caller
/// can carry on with the next block.
fn export_one(report: &mut Report, m: &PayloadMatch, dest: &Path) {
    info!("Extracting to file: {}", m.header.filename_lossy());
    match extract_block(&m.header, &m.block.data, dest) {
        Ok(out) => {
            if out.is_short() {
                report.warnings.push(Warning::ShortWrite {
                    path:     out.path.clone(),
                    written:  out.written,
                    expected: out.expected,
                });
            }
            report.extracted.push(out.path);
        }
        Err(ExtractError::UnsafePath(filename)) => {
            warn!("Won't extract to filename containing path characters: {filename:?}");
            report.warnings.push(Warning::UnsafePath { filename });
        }
        Err(e) => {
            warn!("Can't extract block at {}: {e}", m.position);
            report.warnings.push(Warning::ExtractFailed { position: m.position, reason: e.to_string() });
        }
    }
}
