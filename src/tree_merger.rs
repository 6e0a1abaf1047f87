//! Bottom-up duplicate-directory detection (spec section 4.5). Promotes
//! confirmed duplicate *files* into duplicate *directories* once every file
//! below a directory has been accounted for.
//!
//! There's no teacher code for this -- `kornelski-dupe-krill` only dedupes
//! files -- so this is grounded directly on `lib/treemerge.c` /
//! `src/treemerge.c`'s algorithm: a pre-pass file count per directory, an
//! order-independent digest accumulated as files and finished children
//! attach, and promotion once a directory's attached count reaches its
//! pre-pass count.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::criteria::{Criteria, Rankable};
use crate::file_record::FileRecord;
use crate::preprocessor::TraversalEntry;

/// Counts regular files below each directory, ignoring the configured
/// `follow-symlinks` ambiguity noted as an open question in spec section 9
/// by simply counting every non-directory traversal entry where it falls:
/// symlinks are counted like any other leaf, since `follow-symlinks`
/// already decided at traversal time whether a symlink became a regular
/// file or stayed a link.
///
/// Stops climbing once it reaches one of `roots` -- a root's own count is
/// still recorded (so two duplicate root directories can themselves be
/// detected as a match), but its parent never is. Without this, a root's
/// parent directory would, by simple arithmetic, often end up with exactly
/// as many files as its children report between them, and would wrongly
/// absorb those children into a single phantom node instead of letting
/// them surface as the topmost matching pair. `TreeMerger` relies on a
/// directory getting no entry here to mean "at or above an input root,
/// never merge past it" (see `try_promote`).
pub fn pre_pass_counts(entries: &[TraversalEntry], roots: &[PathBuf]) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for entry in entries {
        if entry.metadata.is_dir {
            continue;
        }
        let mut dir = entry.path.parent().map(|p| p.to_path_buf());
        while let Some(d) = dir {
            let key = d.to_string_lossy().into_owned();
            *counts.entry(key).or_insert(0u64) += 1;
            if roots.iter().any(|r| r == &d) {
                break;
            }
            dir = d.parent().map(|p| p.to_path_buf());
        }
    }
    counts
}

#[derive(Debug, Default)]
struct DirectoryNode {
    pre_pass_count: u64,
    own_files_attached: u64,
    children_satisfied: u64,
    attached_files: Vec<FileRecord>,
    /// Child directory paths that have already been folded into this
    /// node's digest, kept so a topmost group's report can gather every
    /// descendant's files without a second traversal.
    children: Vec<String>,
    digest_acc: u64,
    child_digest_set: BTreeSet<u64>,
    preferred_count: u32,
    depth: u32,
    finished: bool,
    was_merged: bool,
}

impl DirectoryNode {
    fn attached_count(&self) -> u64 {
        self.own_files_attached + self.children_satisfied
    }
}

pub struct DuplicateDirGroup {
    pub dirs: Vec<DirectoryReport>,
}

pub struct DirectoryReport {
    pub path: String,
    pub files: Vec<FileRecord>,
    pub original: bool,
}

impl Rankable for DirectoryReport {
    fn mtime(&self) -> f64 {
        self.files.iter().map(|f| f.mtime).fold(f64::INFINITY, f64::min)
    }
    fn basename(&self) -> &str {
        Path::new(&self.path).file_name().and_then(|s| s.to_str()).unwrap_or(&self.path)
    }
    fn dirname(&self) -> &str {
        &self.path
    }
    fn path(&self) -> &str {
        &self.path
    }
    fn depth(&self) -> u32 {
        self.path.matches('/').count() as u32
    }
    fn link_count(&self) -> u64 {
        self.files.iter().map(|f| f.link_count).sum()
    }
    fn outer_link_count(&self) -> u64 {
        self.files.iter().map(|f| f.outer_link_count).sum()
    }
    fn path_index(&self) -> u32 {
        self.files.iter().map(|f| f.path_index).min().unwrap_or(0)
    }
    fn preferred_path(&self) -> bool {
        self.files.iter().any(|f| f.flags.preferred_path)
    }
}

/// Mixes a digest snapshot into an order-independent running total. Plain
/// wrapping addition of the first 8 bytes: order-independence is what spec
/// section 3 asks for ("cumulative order-independent digest"), not
/// cryptographic strength -- the underlying file digests already provide
/// that.
fn fold_digest(acc: u64, bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    acc.wrapping_add(u64::from_le_bytes(buf))
}

pub struct TreeMerger {
    pre_pass_counts: HashMap<String, u64>,
    honour_dir_layout: bool,
    filter_hidden: bool,
    nodes: HashMap<String, DirectoryNode>,
}

impl TreeMerger {
    pub fn new(pre_pass_counts: HashMap<String, u64>, honour_dir_layout: bool, filter_hidden: bool) -> Self {
        TreeMerger { pre_pass_counts, honour_dir_layout, filter_hidden, nodes: HashMap::new() }
    }

    /// Attaches a confirmed duplicate file to its parent directory's node,
    /// then tries to promote that node (and its ancestors) upward.
    pub fn feed(&mut self, file: FileRecord) {
        let dir = file.dir_path.to_string();
        let depth = dir.matches('/').count() as u32;
        let pre_pass = self.pre_pass_counts.get(&dir).copied().unwrap_or(u64::MAX);

        let digest_bytes = file.digest.as_ref().map(|d| d.snapshot().as_bytes().to_vec()).unwrap_or_default();
        let preferred = file.flags.preferred_path;

        let node = self.nodes.entry(dir.clone()).or_insert_with(|| DirectoryNode {
            pre_pass_count: pre_pass,
            depth,
            ..Default::default()
        });
        node.digest_acc = fold_digest(node.digest_acc, &digest_bytes);
        if self.honour_dir_layout {
            node.digest_acc = fold_digest(node.digest_acc, file.basename.as_bytes());
        }
        node.own_files_attached += 1;
        if preferred {
            node.preferred_count += 1;
        }
        node.attached_files.push(file);

        self.try_promote(dir);
    }

    /// Folds `dir` into its parent, and only marks `dir` (and the rest of
    /// the parent's already-recorded children) as merged away once the
    /// parent itself becomes finished -- which may happen on this call or
    /// on a later call triggered by a sibling directory finishing. Until
    /// then `dir` remains a valid topmost candidate on its own.
    fn try_promote(&mut self, mut dir: String) {
        loop {
            let (attached, pre_pass, already_finished) = {
                let node = self.nodes.get(&dir).unwrap();
                (node.attached_count(), node.pre_pass_count, node.finished)
            };
            if already_finished || attached < pre_pass {
                return;
            }
            self.nodes.get_mut(&dir).unwrap().finished = true;

            let parent = match Path::new(&dir).parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().into_owned(),
                _ => return,
            };

            let (child_digest, child_preferred, child_depth) = {
                let child = &self.nodes[&dir];
                (child.digest_acc, child.preferred_count, child.depth)
            };
            let parent_pre_pass = self.pre_pass_counts.get(&parent).copied().unwrap_or(u64::MAX);
            let parent_node = self.nodes.entry(parent.clone()).or_insert_with(|| DirectoryNode {
                pre_pass_count: parent_pre_pass,
                depth: child_depth.saturating_sub(1),
                ..Default::default()
            });
            parent_node.children_satisfied += pre_pass;
            parent_node.digest_acc = parent_node.digest_acc.wrapping_add(child_digest);
            parent_node.child_digest_set.insert(child_digest);
            parent_node.preferred_count += child_preferred;
            parent_node.children.push(dir.clone());

            if parent_node.attached_count() >= parent_node.pre_pass_count {
                let absorbed = parent_node.children.clone();
                for kid in &absorbed {
                    if let Some(k) = self.nodes.get_mut(kid) {
                        k.was_merged = true;
                    }
                }
            }

            dir = parent;
        }
    }

    /// Groups top-most finished directories by exact digest and
    /// child-digest-set equality, per spec section 4.5 step 4. Directories
    /// that never finished, or finished without a peer, have their files
    /// forwarded as ordinary duplicate-file candidates (spec section 4.5
    /// step 5, "residuals").
    pub fn extract(self, rank: &Criteria) -> (Vec<DuplicateDirGroup>, Vec<FileRecord>) {
        let mut nodes = self.nodes;
        let filter_hidden = self.filter_hidden;

        let mut top_level: Vec<String> = nodes.iter().filter(|(_, n)| !n.was_merged).map(|(k, _)| k.clone()).collect();
        top_level.sort_by_key(|p| nodes[p].depth);

        let mut by_key: HashMap<(u64, Vec<u64>), Vec<String>> = HashMap::new();
        let mut residual_paths = Vec::new();

        for path in top_level {
            let node = &nodes[&path];
            if !node.finished || (filter_hidden && is_hidden(&path)) {
                residual_paths.push(path);
                continue;
            }
            let key = (node.digest_acc, node.child_digest_set.iter().copied().collect());
            by_key.entry(key).or_default().push(path);
        }

        let mut groups = Vec::new();
        for (_, mut paths) in by_key {
            if paths.len() < 2 {
                residual_paths.extend(paths);
                continue;
            }
            paths.sort_by_key(|p| nodes[p].depth);

            let mut reports: Vec<DirectoryReport> = paths
                .into_iter()
                .map(|path| {
                    let files = collect_files(&mut nodes, &path);
                    DirectoryReport { path, files, original: false }
                })
                .collect();
            reports.sort_by(|a, b| rank.compare(a, b));
            for (i, r) in reports.iter_mut().enumerate() {
                r.original = i == 0;
            }
            groups.push(DuplicateDirGroup { dirs: reports });
        }

        let mut residual_files = Vec::new();
        for path in residual_paths {
            residual_files.extend(collect_files(&mut nodes, &path));
        }

        (groups, residual_files)
    }
}

/// Drains `dir`'s own files plus every descendant's, following the
/// `children` links recorded during promotion.
fn collect_files(nodes: &mut HashMap<String, DirectoryNode>, dir: &str) -> Vec<FileRecord> {
    let (mut files, children) = match nodes.get_mut(dir) {
        Some(node) => (std::mem::take(&mut node.attached_files), std::mem::take(&mut node.children)),
        None => return Vec::new(),
    };
    for child in children {
        files.extend(collect_files(nodes, &child));
    }
    files
}

fn is_hidden(path: &str) -> bool {
    Path::new(path).file_name().and_then(|n| n.to_str()).map(|n| n.starts_with('.')).unwrap_or(false)
}
