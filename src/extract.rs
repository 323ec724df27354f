//! Writing a payload back out to disk under its stored filename.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::header::{HeaderError, PayloadHeader};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Won't extract to filename containing path characters: {0:?}")]
    UnsafePath(String),
    #[error("Bad payload: {0}")]
    Payload(#[from] HeaderError),
    #[error("Can't open {path}: {source}")]
    Io { path: PathBuf, #[source] source: io::Error },
}

/// Result of a completed extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub path:     PathBuf,
    pub written:  usize,
    /// Bytes the header promised.
    pub expected: usize,
}

impl Extracted {
    /// Fewer bytes reached the file than the header declared.  The partial
    /// file is left on disk.
    pub fn is_short(&self) -> bool {
        self.written < self.expected
    }
}

/// True when the stored `name` can be joined onto a directory without
/// leaving it.
pub fn is_safe_filename(name: &[u8]) -> bool {
    !name.is_empty()
        && name != b"."
        && name != b".."
        && !name.iter().any(|&b| b == b'/' || std::path::is_separator(char::from(b)))
}

/// The stored filename bytes as a path component, unchanged.
#[cfg(unix)]
fn stored_name(name: &[u8]) -> OsString {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    OsStr::from_bytes(name).to_owned()
}

#[cfg(not(unix))]
fn stored_name(name: &[u8]) -> OsString {
    OsString::from(String::from_utf8_lossy(name).into_owned())
}

/// Write `payload` to `dest_dir/<header.filename>`, creating or truncating
/// the file.
///
/// At most `header.payload_size` bytes are written.  Running short (a
/// `payload` slice shorter than declared, or a failed write part-way) is
/// not an error: the shortfall shows in [`Extracted::is_short`] and is
/// logged.
pub fn extract(header: &PayloadHeader, payload: &[u8], dest_dir: &Path) -> Result<Extracted, ExtractError> {
    if !is_safe_filename(&header.filename) {
        return Err(ExtractError::UnsafePath(header.filename_lossy().into_owned()));
    }
    let path     = dest_dir.join(stored_name(&header.filename));
    let expected = header.payload_size as usize;
    let data     = &payload[..payload.len().min(expected)];

    let mut file = File::create(&path)
        .map_err(|source| ExtractError::Io { path: path.clone(), source })?;
    let written = write_counted(&mut file, data);
    if let Err(e) = file.flush() {
        warn!("Can't flush {}: {e}", path.display());
    }

    let out = Extracted { path, written, expected };
    if out.is_short() {
        warn!("Short write to {}: {} of {} bytes", out.path.display(), out.written, out.expected);
    } else {
        info!("Extracted {} bytes to {}", out.written, out.path.display());
    }
    Ok(out)
}

/// Extract the payload that follows the header in `block_data`.
pub fn extract_block(header: &PayloadHeader, block_data: &[u8], dest_dir: &Path) -> Result<Extracted, ExtractError> {
    let payload = header.payload(block_data)?;
    extract(header, payload, dest_dir)
}

/// Write as much of `data` as the writer accepts, returning the byte count.
fn write_counted<W: Write>(writer: &mut W, data: &[u8]) -> usize {
    let mut written = 0;
    while written < data.len() {
        match writer.write(&data[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Write failed after {written} bytes: {e}");
                break;
            }
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn writes_payload_under_stored_name() {
        let dir = tempfile::tempdir().unwrap();
        let header = PayloadHeader::new("image/png", "art/cover.png", 4);
        let out = extract(&header, b"\x89PNG", dir.path()).unwrap();
        assert_eq!(out.path, dir.path().join("cover.png"));
        assert!(!out.is_short());
        assert_eq!(fs::read(&out.path).unwrap(), b"\x89PNG");
    }

    #[test]
    fn truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.gif"), b"much longer old contents").unwrap();
        let header = PayloadHeader::new("image/gif", "a.gif", 3);
        extract(&header, b"GIF", dir.path()).unwrap();
        assert_eq!(fs::read(dir.path().join("a.gif")).unwrap(), b"GIF");
    }

    #[test]
    fn rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let mut header = PayloadHeader::new("image/png", "x", 4);
        header.filename = "../../etc/passwd".into();
        let err = extract(&header, b"root", dir.path()).unwrap_err();
        assert!(matches!(err, ExtractError::UnsafePath(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn rejects_dot_names() {
        assert!(!is_safe_filename(b""));
        assert!(!is_safe_filename(b"."));
        assert!(!is_safe_filename(b".."));
        assert!(!is_safe_filename(b"a/b"));
        assert!(is_safe_filename(b"..cover.png"));
        assert!(is_safe_filename(&[0xFF, b'a']));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_name_written_byte_for_byte() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let mut header = PayloadHeader::new("image/png", "x", 2);
        header.filename = vec![0xFF, b'a'];
        let out = extract(&header, b"ok", dir.path()).unwrap();
        assert_eq!(out.path, dir.path().join(OsStr::from_bytes(&[0xFF, b'a'])));
        let names: Vec<_> = fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(names, vec![OsStr::from_bytes(&[0xFF, b'a']).to_owned()]);
        assert_eq!(fs::read(&out.path).unwrap(), b"ok");
    }

    #[test]
    fn short_payload_is_reported_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let header = PayloadHeader::new("image/png", "p.png", 10);
        let out = extract(&header, b"abc", dir.path()).unwrap();
        assert!(out.is_short());
        assert_eq!(out.written, 3);
        assert_eq!(fs::read(&out.path).unwrap(), b"abc");
    }

    #[test]
    fn block_with_oversized_length_fails() {
        let dir = tempfile::tempdir().unwrap();
        let header = PayloadHeader::new("image/png", "p.png", 1000);
        let mut data = header.encode().to_vec();
        data.extend_from_slice(b"tiny");
        let err = extract_block(&header, &data, dir.path()).unwrap_err();
        assert!(matches!(err, ExtractError::Payload(HeaderError::PayloadOutOfRange { .. })));
        assert!(!dir.path().join("p.png").exists());
    }
}
