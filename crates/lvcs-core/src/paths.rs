//! Path helpers. Paths are `/`-separated names relative to the synthetic root.

pub const SEPARATOR: char = '/';

/// Splits a path into its non-empty segments.
pub fn split(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty()).collect()
}

pub fn name(path: &str) -> &str {
    split(path).last().copied().unwrap_or("")
}

/// Parent path, `None` for top-level entries and the root itself.
pub fn parent(path: &str) -> Option<String> {
    let segments = split(path);
    if segments.len() < 2 {
        return None;
    }
    Some(segments[..segments.len() - 1].join("/"))
}
