//! Node kind classification.

use serde::Serialize;

use crate::config::ContentConfig;

/// What a tree node is, from the site's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Directory,
    Page,
    Article,
    /// Any other file under the content directory (images, attachments)
    Static,
    /// Everything outside the content directory (config, theme, scripts)
    Unknown,
}

impl NodeKind {
    /// Classify a site-relative path.
    ///
    /// Content-format files under a page path are pages, under an article
    /// path articles. Pages are checked first since the default page path
    /// lives inside the default article path.
    pub fn classify(rel: &str, is_dir: bool, content: &ContentConfig) -> Self {
        if is_dir {
            return Self::Directory;
        }

        let ext = rel
            .rsplit_once('/')
            .map_or(rel, |(_, name)| name)
            .rsplit_once('.')
            .map(|(_, ext)| ext);

        if let Some(ext) = ext
            && content.is_format(ext)
        {
            if content.pages.iter().any(|p| is_under(rel, p)) {
                return Self::Page;
            }
            if content.articles.iter().any(|p| is_under(rel, p)) {
                return Self::Article;
            }
        }

        if is_under(rel, &content.dir) {
            Self::Static
        } else {
            Self::Unknown
        }
    }

    /// Pages and articles carry front-matter.
    pub fn has_meta(self) -> bool {
        matches!(self, Self::Page | Self::Article)
    }
}

/// `rel` lies strictly below the directory `prefix`.
pub fn is_under(rel: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    prefix.is_empty()
        || rel
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}
