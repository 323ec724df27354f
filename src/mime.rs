//! Label guessing from a filename extension.

/// Label used when no suffix in [`SUFFIX_TABLE`] matches.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Checked in order; the first matching suffix wins.
pub const SUFFIX_TABLE: &[(&str, &str)] = &[
    (".jpg",  "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".png",  "image/png"),
    (".gif",  "image/gif"),
];

/// Map `filename` to a MIME label by its (case-insensitive) suffix.
pub fn guess(filename: &str) -> &'static str {
    let name = filename.as_bytes();
    SUFFIX_TABLE
        .iter()
        .find(|(suffix, _)| has_suffix_ignore_case(name, suffix.as_bytes()))
        .map(|&(_, label)| label)
        .unwrap_or(UNKNOWN_LABEL)
}

fn has_suffix_ignore_case(name: &[u8], suffix: &[u8]) -> bool {
    // Names shorter than the suffix are simply not a match.
    match name.len().checked_sub(suffix.len()) {
        Some(start) => name[start..].eq_ignore_ascii_case(suffix),
        None        => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_suffixes() {
        assert_eq!(guess("cover.jpg"), "image/jpeg");
        assert_eq!(guess("cover.JPEG"), "image/jpeg");
        assert_eq!(guess("dir/back.Png"), "image/png");
        assert_eq!(guess("anim.GIF"), "image/gif");
    }

    #[test]
    fn unknown_suffix() {
        assert_eq!(guess("notes.txt"), UNKNOWN_LABEL);
        assert_eq!(guess("jpg"), UNKNOWN_LABEL);
        assert_eq!(guess(""), UNKNOWN_LABEL);
    }

    #[test]
    fn short_names_do_not_underflow() {
        assert_eq!(guess("g"), UNKNOWN_LABEL);
        assert_eq!(guess(".gif"), "image/gif");
    }
}
