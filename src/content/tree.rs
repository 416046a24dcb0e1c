//! Versioned snapshot of the site source tree.
//!
//! Snapshots are immutable once published. A transaction clones the
//! current tree (nodes are `Arc`-shared, so this copies pointers only),
//! edits the copy and publishes it with the next version.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::node::{ContentNode, Origin};

#[derive(Debug, Clone, Default)]
pub struct SiteTree {
    version: u64,
    nodes: BTreeMap<String, Arc<ContentNode>>,
}

impl SiteTree {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, path: &str) -> Option<&Arc<ContentNode>> {
        self.nodes.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in path order (parents before children).
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ContentNode>> {
        self.nodes.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Direct children of `dir` (`""` is the implicit root).
    pub fn children<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = &'a Arc<ContentNode>> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(move |(path, _)| path.starts_with(&prefix))
            .filter(move |(path, _)| {
                let rest = &path[if dir.is_empty() { 0 } else { dir.len() + 1 }..];
                !rest.contains('/')
            })
            .map(|(_, node)| node)
    }

    /// Start a transaction: a copy stamped with the next version.
    pub(super) fn next(&self) -> Self {
        Self {
            version: self.version + 1,
            nodes: self.nodes.clone(),
        }
    }

    /// Insert or replace a node, creating missing parent directories.
    ///
    /// Every path that changed is appended to `changed`, parents first.
    pub(super) fn insert(&mut self, node: ContentNode, changed: &mut Vec<String>) {
        let (version, origin) = (node.version, node.origin);
        for parent in ancestors(&node.path) {
            let is_dir = self.nodes.get(parent).is_some_and(|n| n.is_dir());
            if !is_dir {
                // A file where a directory is needed gets replaced.
                self.nodes.insert(
                    parent.to_string(),
                    Arc::new(ContentNode::directory(parent, version, origin)),
                );
                changed.push(parent.to_string());
            }
        }

        if !node.is_dir() {
            // A directory replaced by a file takes its subtree with it.
            self.remove_descendants(&node.path, changed);
        }
        changed.push(node.path.clone());
        self.nodes.insert(node.path.clone(), Arc::new(node));
    }

    /// Make sure a directory node exists at `path` (and above it).
    pub(super) fn ensure_dir(
        &mut self,
        path: &str,
        version: u64,
        origin: Origin,
        changed: &mut Vec<String>,
    ) {
        if self.nodes.get(path).is_some_and(|n| n.is_dir()) {
            return;
        }
        self.insert(ContentNode::directory(path, version, origin), changed);
    }

    /// Remove a node and its whole subtree. Returns false if absent.
    pub(super) fn remove(&mut self, path: &str, changed: &mut Vec<String>) -> bool {
        if self.nodes.remove(path).is_none() {
            return false;
        }
        self.remove_descendants(path, changed);
        changed.push(path.to_string());
        true
    }

    fn remove_descendants(&mut self, path: &str, changed: &mut Vec<String>) {
        let prefix = format!("{path}/");
        let doomed: Vec<String> = self
            .nodes
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .map(|(p, _)| p.clone())
            .collect();
        for p in doomed {
            self.nodes.remove(&p);
            changed.push(p);
        }
    }

    /// Verify that every node's parent chain is present as directories.
    #[cfg(test)]
    pub fn check_parent_chain(&self) -> Result<(), String> {
        for path in self.nodes.keys() {
            if let Some(parent) = parent_of(path)
                && !self.nodes.get(parent).is_some_and(|n| n.is_dir())
            {
                return Err(format!("orphan node `{path}`: parent `{parent}` missing"));
            }
        }
        Ok(())
    }
}

/// Parent path, or `None` for top-level entries (whose parent is the root).
pub fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

/// Proper ancestors of `path`, outermost first: `a/b/c` → `a`, `a/b`.
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(i, _)| &path[..i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::kind::NodeKind;

    fn file(path: &str, version: u64) -> ContentNode {
        ContentNode::file(path, NodeKind::Static, b"x".to_vec(), version, Origin::Scan)
    }

    #[test]
    fn test_insert_creates_parents() {
        let mut tree = SiteTree::default().next();
        let mut changed = Vec::new();
        tree.insert(file("content/2024/a.png", 1), &mut changed);

        assert_eq!(changed, vec!["content", "content/2024", "content/2024/a.png"]);
        assert!(tree.get("content").unwrap().is_dir());
        assert_eq!(tree.version(), 1);
        tree.check_parent_chain().unwrap();
    }

    #[test]
    fn test_remove_takes_subtree() {
        let mut tree = SiteTree::default().next();
        let mut changed = Vec::new();
        tree.insert(file("content/a/x.png", 1), &mut changed);
        tree.insert(file("content/a/y.png", 1), &mut changed);
        tree.insert(file("content/ab.png", 1), &mut changed);

        changed.clear();
        assert!(tree.remove("content/a", &mut changed));
        assert_eq!(changed.len(), 3);
        assert!(tree.contains("content/ab.png"));
        assert!(!tree.contains("content/a/x.png"));
        assert!(!tree.remove("content/a", &mut changed));
        tree.check_parent_chain().unwrap();
    }

    #[test]
    fn test_file_replaces_directory() {
        let mut tree = SiteTree::default().next();
        let mut changed = Vec::new();
        tree.insert(file("content/a/x.png", 1), &mut changed);
        tree.insert(file("content/a", 1), &mut changed);

        assert!(!tree.get("content/a").unwrap().is_dir());
        assert!(!tree.contains("content/a/x.png"));
        tree.check_parent_chain().unwrap();
    }

    #[test]
    fn test_children() {
        let mut tree = SiteTree::default().next();
        let mut changed = Vec::new();
        tree.insert(file("content/a.png", 1), &mut changed);
        tree.insert(file("content/sub/b.png", 1), &mut changed);
        tree.insert(file("top.txt", 1), &mut changed);

        let root: Vec<_> = tree.children("").map(|n| n.path.as_str()).collect();
        assert_eq!(root, vec!["content", "top.txt"]);
        let content: Vec<_> = tree.children("content").map(|n| n.path.as_str()).collect();
        assert_eq!(content, vec!["content/a.png", "content/sub"]);
    }

    #[test]
    fn test_next_does_not_touch_original() {
        let mut base = SiteTree::default().next();
        let mut changed = Vec::new();
        base.insert(file("a.txt", 1), &mut changed);

        let mut next = base.next();
        next.remove("a.txt", &mut changed);
        assert!(base.contains("a.txt"));
        assert_eq!(next.version(), base.version() + 1);
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("a/b/c.md"), Some("a/b"));
        assert_eq!(parent_of("top.md"), None);
    }
}
