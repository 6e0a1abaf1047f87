//! The file record: the unit of work carried from traversal through the
//! preprocessor, shredder, and (optionally) the tree merger. Generalizes
//! the teacher's `file.rs::FileContent` (path + metadata + incremental
//! hasher) into the richer record spec section 3 describes: trie-backed
//! identity, lint classification, hardlink/pre-match cluster membership,
//! and a progressive digest rather than a fixed SHA-1 range list.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::criteria::Rankable;
use crate::digest::Digest;
use crate::path_trie::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardlinkClusterId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreMatchClusterId(pub u32);

/// Why a record was diverted out of the duplicate-candidate path, or why it
/// was folded into a duplicate result. See spec section 3 and section 4.4
/// ("other-lint diversion").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintKind {
    DuplicateCandidate,
    DuplicateDirCandidate,
    EmptyFile,
    EmptyDir,
    BadLink,
    BadUid,
    BadGid,
    BadUgid,
    NonStripped,
    Unique,
    PartOfDirectory,
    Unknown,
}

impl LintKind {
    /// Everything but `DuplicateCandidate`/`DuplicateDirCandidate` is
    /// "other lint": diverted straight to the output sink rather than fed
    /// to the shredder.
    pub fn is_other_lint(self) -> bool {
        !matches!(self, LintKind::DuplicateCandidate | LintKind::DuplicateDirCandidate)
    }
}

/// Flags set at traversal time or late during ranking.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaggedFlags {
    pub preferred_path: bool,
    pub hidden: bool,
    pub symlink: bool,
    /// mtime newer than a configured threshold.
    pub new: bool,
    pub cached_externally: bool,
}

/// A small cache of regex-match results keyed by the originals-criteria
/// chain's regex index, so a multi-pass sort doesn't re-run the same
/// pattern against the same string. Mirrors `RmPatternBitmask` in
/// `lib/rank.c`, but sized to the chain actually configured rather than a
/// fixed-width bitmask.
#[derive(Debug, Default)]
pub struct RegexMatchCache {
    cached: Vec<AtomicBool>,
    valid: Vec<AtomicBool>,
}

impl RegexMatchCache {
    pub fn with_capacity(n: usize) -> Self {
        RegexMatchCache {
            cached: (0..n).map(|_| AtomicBool::new(false)).collect(),
            valid: (0..n).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn get_or_compute(&self, idx: usize, compute: impl FnOnce() -> bool) -> bool {
        if self.valid[idx].load(Ordering::Relaxed) {
            return self.cached[idx].load(Ordering::Relaxed);
        }
        let result = compute();
        self.cached[idx].store(result, Ordering::Relaxed);
        self.valid[idx].store(true, Ordering::Relaxed);
        result
    }
}

#[derive(Debug)]
pub struct FileRecord {
    pub parent: NodeId,
    pub basename: Box<str>,
    /// The parent directory's path, shared (via `Arc`) across every record
    /// in the same directory.
    pub dir_path: Arc<str>,
    full_path: OnceLock<Box<str>>,

    pub device: u64,
    pub inode: u64,
    pub link_count: u64,
    pub outer_link_count: u64,
    pub mtime: f64,

    pub size: u64,
    pub effective_size: u64,
    /// Absolute byte offset in the file where the hashed window begins
    /// (`skip-start`, resolved). `hash_offset`/`seek_offset` are relative
    /// to this, not to the start of the file.
    pub window_start: u64,

    pub hash_offset: u64,
    pub seek_offset: u64,

    pub digest: Option<Box<dyn Digest>>,

    pub flags: TaggedFlags,
    pub lint_kind: LintKind,
    pub original: bool,

    pub hardlink_cluster: Option<HardlinkClusterId>,
    pub pre_match_cluster: Option<PreMatchClusterId>,

    pub depth: u32,
    pub path_index: u32,

    pub regex_cache: RegexMatchCache,
}

/// Everything about a file known at traversal time, before it enters
/// preprocessing. Fields not listed here (digest, cluster membership,
/// `original`) are set later in the pipeline.
pub struct FileRecordInit {
    pub parent: NodeId,
    pub basename: Box<str>,
    pub dir_path: Arc<str>,
    pub device: u64,
    pub inode: u64,
    pub link_count: u64,
    pub outer_link_count: u64,
    pub mtime: f64,
    pub size: u64,
    pub effective_size: u64,
    pub window_start: u64,
    pub flags: TaggedFlags,
    pub lint_kind: LintKind,
    pub depth: u32,
    pub path_index: u32,
    pub regex_slots: usize,
}

impl FileRecord {
    pub fn new(init: FileRecordInit) -> Self {
        FileRecord {
            parent: init.parent,
            basename: init.basename,
            dir_path: init.dir_path,
            full_path: OnceLock::new(),
            device: init.device,
            inode: init.inode,
            link_count: init.link_count,
            outer_link_count: init.outer_link_count,
            mtime: init.mtime,
            size: init.size,
            effective_size: init.effective_size,
            window_start: init.window_start,
            hash_offset: 0,
            seek_offset: 0,
            digest: None,
            flags: init.flags,
            lint_kind: init.lint_kind,
            original: false,
            hardlink_cluster: None,
            pre_match_cluster: None,
            depth: init.depth,
            path_index: init.path_index,
            regex_cache: RegexMatchCache::with_capacity(init.regex_slots),
        }
    }

    pub fn path(&self) -> &str {
        self.full_path.get_or_init(|| format!("{}/{}", self.dir_path, self.basename).into_boxed_str())
    }

    /// `hash_offset <= seek_offset <= effective_size` must hold at every
    /// suspension point (spec section 3's invariant on the file record).
    pub fn check_offset_invariant(&self) {
        debug_assert!(self.hash_offset <= self.seek_offset);
        debug_assert!(self.seek_offset <= self.effective_size);
    }

    pub fn bytes_remaining(&self) -> u64 {
        self.effective_size.saturating_sub(self.hash_offset)
    }

    pub fn is_fully_hashed(&self) -> bool {
        self.hash_offset >= self.effective_size
    }
}

impl Rankable for FileRecord {
    fn mtime(&self) -> f64 {
        self.mtime
    }
    fn basename(&self) -> &str {
        &self.basename
    }
    fn dirname(&self) -> &str {
        &self.dir_path
    }
    fn path(&self) -> &str {
        FileRecord::path(self)
    }
    fn depth(&self) -> u32 {
        self.depth
    }
    fn link_count(&self) -> u64 {
        self.link_count
    }
    fn outer_link_count(&self) -> u64 {
        self.outer_link_count
    }
    fn path_index(&self) -> u32 {
        self.path_index
    }
    fn preferred_path(&self) -> bool {
        self.flags.preferred_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_trie::PathTrie;

    fn make_record(trie: &PathTrie) -> FileRecord {
        let root = trie.intern_root("/data");
        FileRecord::new(FileRecordInit {
            parent: root,
            basename: "a.txt".into(),
            dir_path: trie.build_path(root).to_string_lossy().into_owned().into(),
            device: 1,
            inode: 42,
            link_count: 1,
            outer_link_count: 0,
            mtime: 0.0,
            size: 100,
            effective_size: 100,
            window_start: 0,
            flags: TaggedFlags::default(),
            lint_kind: LintKind::DuplicateCandidate,
            depth: 1,
            path_index: 0,
            regex_slots: 0,
        })
    }

    #[test]
    fn path_is_built_and_cached() {
        let trie = PathTrie::new();
        let record = make_record(&trie);
        assert_eq!(record.path(), "/data/a.txt");
        assert_eq!(record.path(), "/data/a.txt");
    }

    #[test]
    fn fully_hashed_when_offset_reaches_effective_size() {
        let trie = PathTrie::new();
        let mut record = make_record(&trie);
        assert!(!record.is_fully_hashed());
        record.hash_offset = record.effective_size;
        assert!(record.is_fully_hashed());
        assert_eq!(record.bytes_remaining(), 0);
    }

    #[test]
    fn regex_cache_memoizes_first_computation() {
        let cache = RegexMatchCache::with_capacity(1);
        let mut calls = 0;
        assert!(cache.get_or_compute(0, || {
            calls += 1;
            true
        }));
        assert!(cache.get_or_compute(0, || {
            calls += 1;
            false
        }));
        assert_eq!(calls, 1);
    }
}
