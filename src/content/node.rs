//! Content nodes: one file or directory of the site source tree.

use serde::Serialize;
use std::path::Path;

use super::hash::ContentHash;
use super::kind::NodeKind;
use super::meta::{self, NodeDiagnostic, PageMeta, SourceFormat};
use crate::utils::mime;

/// Who caused a node's most recent change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Scan,
    Ui,
    External,
}

/// Diagnostic field for undecodable page or article bodies.
const CONTENT_FIELD: &str = "content";

#[derive(Debug, Clone, PartialEq)]
pub struct ContentNode {
    /// Relative, slash-separated
    pub path: String,
    pub kind: NodeKind,
    /// `None` for directories
    pub hash: Option<ContentHash>,
    pub size: u64,
    /// Empty means valid
    pub diagnostics: Vec<NodeDiagnostic>,
    pub meta: Option<PageMeta>,
    /// Decoded text for text files; binary files carry only the hash
    pub text: Option<String>,
    /// Snapshot version in which this node last changed
    pub version: u64,
    pub origin: Origin,
}

impl ContentNode {
    pub fn directory(path: impl Into<String>, version: u64, origin: Origin) -> Self {
        Self {
            path: path.into(),
            kind: NodeKind::Directory,
            hash: None,
            size: 0,
            diagnostics: Vec::new(),
            meta: None,
            text: None,
            version,
            origin,
        }
    }

    /// Build a file node from its bytes, validating pages and articles.
    pub fn file(
        path: impl Into<String>,
        kind: NodeKind,
        bytes: Vec<u8>,
        version: u64,
        origin: Origin,
    ) -> Self {
        let path = path.into();
        let hash = ContentHash::of_bytes(&bytes);
        let size = bytes.len() as u64;
        let mime = mime::from_path(Path::new(&path));

        let mut node = Self {
            path,
            kind,
            hash: Some(hash),
            size,
            diagnostics: Vec::new(),
            meta: None,
            text: None,
            version,
            origin,
        };

        if kind.has_meta() {
            match String::from_utf8(bytes) {
                Ok(text) => {
                    let format = SourceFormat::from_extension(node.extension());
                    let extracted = meta::extract(&text, format);
                    node.meta = Some(extracted.meta);
                    node.diagnostics = extracted.diagnostics;
                    node.text = Some(text);
                }
                Err(e) => node.diagnostics.push(NodeDiagnostic::new(
                    CONTENT_FIELD,
                    format!(
                        "not valid UTF-8 (at byte {})",
                        e.utf8_error().valid_up_to()
                    ),
                    None,
                )),
            }
        } else if mime::is_text(mime) {
            node.text = String::from_utf8(bytes).ok();
        }

        node
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn extension(&self) -> &str {
        let name = self.path.rsplit_once('/').map_or(self.path.as_str(), |(_, n)| n);
        name.rsplit_once('.').map_or("", |(_, ext)| ext)
    }

    /// Wire representation. `getTree` omits text, `getNode` includes it.
    pub fn view(&self, with_text: bool) -> NodeView<'_> {
        NodeView {
            path: &self.path,
            kind: self.kind,
            hash: self.hash,
            size: self.size,
            mime: (!self.is_dir()).then(|| mime::from_path(Path::new(&self.path))),
            valid: self.is_valid(),
            diagnostics: &self.diagnostics,
            meta: self.meta.as_ref(),
            text: if with_text { self.text.as_deref() } else { None },
            version: self.version,
            origin: self.origin,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView<'a> {
    pub path: &'a str,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<ContentHash>,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<&'static str>,
    pub valid: bool,
    #[serde(skip_serializing_if = "no_diagnostics")]
    pub diagnostics: &'a [NodeDiagnostic],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<&'a PageMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'a str>,
    pub version: u64,
    pub origin: Origin,
}

fn no_diagnostics(diagnostics: &&[NodeDiagnostic]) -> bool {
    diagnostics.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_article() {
        let node = ContentNode::file(
            "content/post1.md",
            NodeKind::Article,
            b"Title: First\nDate: 2024-01-02\n\nHello".to_vec(),
            3,
            Origin::Ui,
        );
        assert!(node.is_valid());
        assert_eq!(node.version, 3);
        assert_eq!(node.meta.as_ref().unwrap().title.as_deref(), Some("First"));
        assert_eq!(node.text.as_deref(), Some("Title: First\nDate: 2024-01-02\n\nHello"));
    }

    #[test]
    fn test_invalid_utf8_page() {
        let node = ContentNode::file(
            "content/pages/a.md",
            NodeKind::Page,
            vec![b'o', b'k', 0xff, 0xfe],
            1,
            Origin::Scan,
        );
        assert!(!node.is_valid());
        assert_eq!(node.diagnostics[0].field, "content");
        assert!(node.diagnostics[0].message.contains("byte 2"));
        assert!(node.text.is_none());
    }

    #[test]
    fn test_binary_static_has_no_text() {
        let node = ContentNode::file(
            "content/img/a.png",
            NodeKind::Static,
            vec![0x89, b'P', b'N', b'G'],
            1,
            Origin::Scan,
        );
        assert!(node.is_valid());
        assert!(node.text.is_none());
        assert!(node.meta.is_none());
        assert!(node.hash.is_some());
    }

    #[test]
    fn test_unknown_text_file_keeps_text() {
        let node = ContentNode::file(
            "pelicanconf.py",
            NodeKind::Unknown,
            b"SITENAME = 'x'\n".to_vec(),
            1,
            Origin::Scan,
        );
        assert_eq!(node.text.as_deref(), Some("SITENAME = 'x'\n"));
    }

    #[test]
    fn test_view_serialization() {
        let node = ContentNode::file(
            "content/a.md",
            NodeKind::Article,
            b"Date: nope\n\nbody".to_vec(),
            2,
            Origin::External,
        );
        let summary = serde_json::to_value(node.view(false)).unwrap();
        assert_eq!(summary["kind"], "article");
        assert_eq!(summary["valid"], false);
        assert_eq!(summary["origin"], "external");
        assert_eq!(summary["diagnostics"][0]["field"], "date");
        assert!(summary.get("text").is_none());

        let full = serde_json::to_value(node.view(true)).unwrap();
        assert_eq!(full["text"], "Date: nope\n\nbody");
    }

    #[test]
    fn test_directory() {
        let dir = ContentNode::directory("content", 1, Origin::Scan);
        assert!(dir.is_dir());
        let view = serde_json::to_value(dir.view(true)).unwrap();
        assert!(view.get("hash").is_none());
        assert!(view.get("mime").is_none());
    }
}
