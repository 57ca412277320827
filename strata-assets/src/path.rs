//! Logical asset path helpers.
//!
//! Asset paths are forward-slash separated, case-sensitive strings like
//! `textures/blocks/stone.png`. They are resolved against overlay sources
//! and never touch the OS path machinery directly.

/// Substring after the last `.`, or `None` if the path has no dot.
pub fn extension(path: &str) -> Option<&str> {
    let idx = path.rfind('.')?;
    let ext = &path[idx + 1..];
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// Everything before the last `/`, or `""` for top-level paths.
pub fn directory(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Conventional fallback path for an extension: `defaults/default.<ext>`.
pub fn fallback_path(extension: &str) -> String {
    format!("defaults/default.{}", extension)
}

/// True if the path sits directly inside `dir` (one level, exact match).
pub fn in_directory(path: &str, dir: &str) -> bool {
    directory(path) == dir
}

/// True if the path is under `prefix` (recursive). An empty prefix
/// matches everything.
pub fn has_prefix(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }

    path.len() > prefix.len()
        && path.starts_with(prefix)
        && path.as_bytes()[prefix.len()] == b'/'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension() {
        assert_eq!(extension("textures/stone.png"), Some("png"));
        assert_eq!(extension("a.b.c"), Some("c"));
        assert_eq!(extension("noext"), None);
        assert_eq!(extension("trailing."), None);
    }

    #[test]
    fn test_directory() {
        assert_eq!(directory("textures/blocks/stone.png"), "textures/blocks");
        assert_eq!(directory("stone.png"), "");
    }

    #[test]
    fn test_fallback_path() {
        assert_eq!(fallback_path("png"), "defaults/default.png");
    }

    #[test]
    fn test_prefix() {
        assert!(has_prefix("lang/en.json", "lang"));
        assert!(has_prefix("lang/sub/en.json", "lang"));
        assert!(has_prefix("lang/en.json", ""));
        assert!(!has_prefix("language/en.json", "lang"));
        assert!(!has_prefix("lang", "lang"));
    }

    #[test]
    fn test_in_directory() {
        assert!(in_directory("lang/en.json", "lang"));
        assert!(!in_directory("lang/sub/en.json", "lang"));
        assert!(in_directory("root.json", ""));
    }
}
