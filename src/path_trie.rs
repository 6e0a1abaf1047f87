//! A single shared trie backing every file's path, interned during
//! traversal so that equal path components share storage and parent
//! lookups are O(depth) (spec section 9's "Path trie" design note). This
//! replaces the teacher's scheme of carrying a `PathBuf` per `FileContent`
//! (`file.rs::FileContent::path`) with something that scales to millions of
//! files sharing long common prefixes.

use std::path::PathBuf;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

struct Node {
    parent: Option<NodeId>,
    basename: Box<str>,
    children: FxHashMap<Box<str>, NodeId>,
}

/// Interns directory paths. File records store a `(NodeId, basename)` pair
/// rather than a full path; `build_path` reconstructs the full path only
/// when one is actually needed (for output, regex matching, etc).
#[derive(Default)]
pub struct PathTrie {
    nodes: RwLock<Vec<Node>>,
}

impl PathTrie {
    pub fn new() -> Self {
        PathTrie { nodes: RwLock::new(Vec::new()) }
    }

    /// Interns a root path, used as the top of one traversed tree.
    pub fn intern_root(&self, basename: &str) -> NodeId {
        self.intern_child(None, basename)
    }

    /// Interns `basename` as a child of `parent`, returning the existing
    /// node if already present.
    pub fn intern_child(&self, parent: Option<NodeId>, basename: &str) -> NodeId {
        if let Some(p) = parent {
            let nodes = self.nodes.read();
            if let Some(existing) = nodes[p.0 as usize].children.get(basename) {
                return *existing;
            }
        }
        let mut nodes = self.nodes.write();
        if let Some(p) = parent {
            if let Some(existing) = nodes[p.0 as usize].children.get(basename) {
                return *existing;
            }
        }
        let id = NodeId(nodes.len() as u32);
        nodes.push(Node { parent, basename: basename.into(), children: FxHashMap::default() });
        if let Some(p) = parent {
            nodes[p.0 as usize].children.insert(basename.into(), id);
        }
        id
    }

    pub fn depth(&self, mut node: NodeId) -> u32 {
        let nodes = self.nodes.read();
        let mut depth = 0;
        while let Some(parent) = nodes[node.0 as usize].parent {
            depth += 1;
            node = parent;
        }
        depth
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.read()[node.0 as usize].parent
    }

    pub fn basename(&self, node: NodeId) -> Box<str> {
        self.nodes.read()[node.0 as usize].basename.clone()
    }

    /// Ascends from `node` to the root, appending basenames, then reverses.
    /// Given a file's parent-directory node and its own basename, build the
    /// full path with `build_path(parent).join(file_basename)`.
    pub fn build_path(&self, node: NodeId) -> PathBuf {
        let nodes = self.nodes.read();
        let mut parts = Vec::new();
        let mut cur = Some(node);
        while let Some(id) = cur {
            let n = &nodes[id.0 as usize];
            parts.push(n.basename.clone());
            cur = n.parent;
        }
        parts.reverse();
        let mut buf = PathBuf::new();
        for part in parts {
            buf.push(&*part);
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_child_twice_returns_same_id() {
        let trie = PathTrie::new();
        let root = trie.intern_root("/home");
        let a = trie.intern_child(Some(root), "alice");
        let b = trie.intern_child(Some(root), "alice");
        assert_eq!(a, b);
    }

    #[test]
    fn build_path_reconstructs_full_path() {
        let trie = PathTrie::new();
        let root = trie.intern_root("/home");
        let dir = trie.intern_child(Some(root), "alice");
        let leaf = trie.intern_child(Some(dir), "docs");
        assert_eq!(trie.build_path(leaf), PathBuf::from("/home/alice/docs"));
    }

    #[test]
    fn depth_counts_ancestors() {
        let trie = PathTrie::new();
        let root = trie.intern_root("/");
        let a = trie.intern_child(Some(root), "a");
        let b = trie.intern_child(Some(a), "b");
        assert_eq!(trie.depth(root), 0);
        assert_eq!(trie.depth(b), 2);
    }
}
