//! Client-supplied relative path validation.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelPathError {
    #[error("path is empty")]
    Empty,
    #[error("path must be relative")]
    Absolute,
    #[error("path must not contain `.` or `..` segments")]
    Traversal,
    #[error("hidden path segment `{0}`")]
    Hidden(String),
    #[error("path contains a NUL byte")]
    Nul,
}

/// Slash-normalize a relative path: backslashes become `/`, empty segments
/// collapse, and anything that could escape the site root is rejected.
pub fn clean_rel_path(raw: &str) -> Result<String, RelPathError> {
    if raw.contains('\0') {
        return Err(RelPathError::Nul);
    }

    let unified = raw.replace('\\', "/");
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(RelPathError::Absolute);
    }

    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" => continue,
            "." | ".." => return Err(RelPathError::Traversal),
            hidden if hidden.starts_with('.') => {
                return Err(RelPathError::Hidden(hidden.to_string()));
            }
            normal => parts.push(normal),
        }
    }

    if parts.is_empty() {
        return Err(RelPathError::Empty);
    }
    Ok(parts.join("/"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_normalizes_separators() {
        assert_eq!(
            clean_rel_path("content\\posts//a.md").unwrap(),
            "content/posts/a.md"
        );
        assert_eq!(clean_rel_path("content/").unwrap(), "content");
    }

    #[test]
    fn test_clean_rejects_escape() {
        assert_eq!(clean_rel_path("../etc/passwd"), Err(RelPathError::Traversal));
        assert_eq!(clean_rel_path("a/./b"), Err(RelPathError::Traversal));
        assert_eq!(clean_rel_path("/etc/passwd"), Err(RelPathError::Absolute));
        assert_eq!(clean_rel_path("C:/x"), Err(RelPathError::Absolute));
    }

    #[test]
    fn test_clean_rejects_hidden_and_empty() {
        assert_eq!(
            clean_rel_path("content/.git/config"),
            Err(RelPathError::Hidden(".git".into()))
        );
        assert_eq!(clean_rel_path(""), Err(RelPathError::Empty));
        assert_eq!(clean_rel_path("//"), Err(RelPathError::Empty));
    }
}
