//! `[content]` section configuration.
//!
//! ```toml
//! [content]
//! dir = "content"                 # Everything under here is site content
//! pages = ["content/pages"]       # Content-format files here are pages
//! articles = ["content"]          # ...and here articles (pages win)
//! formats = ["md", "rst", "html"] # Extensions treated as content
//! ```

use serde::{Deserialize, Serialize};

use super::check_rel_path;
use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub dir: String,
    pub pages: Vec<String>,
    pub articles: Vec<String>,
    pub formats: Vec<String>,
}

impl ContentConfig {
    pub const DIR: FieldPath = FieldPath::new("content.dir");
    pub const PAGES: FieldPath = FieldPath::new("content.pages");
    pub const ARTICLES: FieldPath = FieldPath::new("content.articles");
    pub const FORMATS: FieldPath = FieldPath::new("content.formats");

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        check_rel_path(Self::DIR, &self.dir, false, diag);
        for page in &self.pages {
            check_rel_path(Self::PAGES, page, false, diag);
        }
        for article in &self.articles {
            check_rel_path(Self::ARTICLES, article, false, diag);
        }

        if self.formats.is_empty() {
            diag.error(Self::FORMATS, "at least one content format is required");
        }
        for format in &self.formats {
            if format.is_empty() || format.contains(['.', '/']) {
                diag.error_with_hint(
                    Self::FORMATS,
                    format!("`{format}` is not a file extension"),
                    "list bare extensions such as \"md\"",
                );
            }
        }
    }

    /// Whether `ext` (without dot, any case) is a content format.
    pub fn is_format(&self, ext: &str) -> bool {
        self.formats.iter().any(|f| f.eq_ignore_ascii_case(ext))
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            dir: "content".into(),
            pages: vec!["content/pages".into()],
            articles: vec!["content".into()],
            formats: ["md", "markdown", "mkd", "mdown", "rst", "html", "htm"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_content_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.content.dir, "content");
        assert_eq!(config.content.pages, vec!["content/pages"]);
        assert!(config.content.is_format("MD"));
        assert!(config.content.is_format("rst"));
        assert!(!config.content.is_format("png"));
    }

    #[test]
    fn test_content_validate() {
        let config = test_parse_config(
            "[content]\ndir = \"../outside\"\nformats = [\".md\"]\npages = [\"/abs\"]",
        );
        let mut diag = ConfigDiagnostics::new();
        config.content.validate(&mut diag);

        let fields: Vec<_> = diag.errors().iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"content.dir"));
        assert!(fields.contains(&"content.pages"));
        assert!(fields.contains(&"content.formats"));
    }

    #[test]
    fn test_empty_formats_rejected() {
        let config = test_parse_config("[content]\nformats = []");
        let mut diag = ConfigDiagnostics::new();
        config.content.validate(&mut diag);
        assert!(diag.has_errors());
    }
}
