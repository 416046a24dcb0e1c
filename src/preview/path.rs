//! URL to output-file resolution.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

/// Resolve a request URL to a file under `root`.
///
/// Directories resolve to their `index.html`. Anything that escapes `root`,
/// including through a symlink, resolves to nothing.
pub fn resolve_path(url: &str, root: &Path) -> Option<PathBuf> {
    let clean = normalize_url(url)?;

    if clean.split('/').any(|segment| segment == "..") {
        return None;
    }

    let canonical = root.join(&clean).canonicalize().ok()?;
    let root = root.canonicalize().ok()?;
    if !canonical.starts_with(&root) {
        return None;
    }

    if canonical.is_file() {
        return Some(canonical);
    }
    let index = canonical.join("index.html");
    (canonical.is_dir() && index.is_file()).then_some(index)
}

/// Strip query and fragment, percent-decode, trim slashes.
fn normalize_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    if decoded.contains(['\\', '\0']) {
        return None;
    }
    Some(decoded.trim_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn output() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("posts/first")).unwrap();
        fs::write(dir.path().join("index.html"), "home").unwrap();
        fs::write(dir.path().join("posts/first/index.html"), "first").unwrap();
        fs::write(dir.path().join("style 1.css"), "body{}").unwrap();
        dir
    }

    #[test]
    fn test_directories_resolve_to_index() {
        let dir = output();
        let root = dir.path();
        assert!(resolve_path("/", root).unwrap().ends_with("index.html"));
        assert!(resolve_path("/posts/first/", root).unwrap().ends_with("posts/first/index.html"));
        assert!(resolve_path("/posts/first", root).unwrap().ends_with("posts/first/index.html"));
        assert!(resolve_path("/posts/", root).is_none());
    }

    #[test]
    fn test_query_and_encoding() {
        let dir = output();
        let root = dir.path();
        assert!(resolve_path("/style%201.css?v=3", root).unwrap().ends_with("style 1.css"));
        assert!(resolve_path("/index.html#top", root).is_some());
        assert!(resolve_path("/missing.html", root).is_none());
    }

    #[test]
    fn test_traversal_rejected() {
        let dir = output();
        let root = dir.path().join("posts");
        assert!(resolve_path("/../index.html", &root).is_none());
        assert!(resolve_path("/%2e%2e/index.html", &root).is_none());
        assert!(resolve_path("/first/..%5c..%5cindex.html", &root).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let dir = output();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        assert!(resolve_path("/link/secret.txt", dir.path()).is_none());
    }
}
