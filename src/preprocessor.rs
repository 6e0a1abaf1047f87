//! Turns the raw traversal stream into size-equivalence groups for the
//! shredder, plus "other lint" diverted straight to the output sink (spec
//! section 4.4). Grounded on the teacher's `scanner.rs::Scanner::add` /
//! `new_fileset` (the `by_inode` hardlink fold and the small-file/
//! non-regular skip checks), generalized to the richer lint taxonomy and
//! match-criteria grouping spec section 4.4 describes.

use std::collections::HashMap;
use std::path::PathBuf;

use rustc_hash::FxHashMap;

use crate::config::Config;
use crate::criteria::Criteria;
use crate::file_record::{FileRecord, FileRecordInit, HardlinkClusterId, LintKind, TaggedFlags};
use crate::metadata::Metadata;
use crate::path_trie::{NodeId, PathTrie};

/// What a traversal collaborator hands the preprocessor for each entry, per
/// spec section 6's "Traversal" input contract.
pub struct TraversalEntry {
    pub path: PathBuf,
    pub metadata: Metadata,
    pub depth: u32,
    pub preferred: bool,
    pub hidden: bool,
    pub path_index: u32,
}

pub struct SizeGroup {
    pub effective_size: u64,
    pub members: Vec<FileRecord>,
}

pub struct PreprocessOutcome {
    pub groups: Vec<SizeGroup>,
    /// Other-lint findings (empty files, empty dirs, bad links, ...),
    /// already tagged and ready for direct emission.
    pub other_lint: Vec<FileRecord>,
}

struct HardlinkCluster {
    representative: usize,
    members: Vec<usize>,
}

pub struct Preprocessor<'a> {
    config: &'a Config,
    rank: &'a Criteria,
    trie: &'a PathTrie,
}

impl<'a> Preprocessor<'a> {
    pub fn new(config: &'a Config, rank: &'a Criteria, trie: &'a PathTrie) -> Self {
        Preprocessor { config, rank, trie }
    }

    pub fn run(&self, entries: impl IntoIterator<Item = TraversalEntry>) -> PreprocessOutcome {
        let mut records: Vec<FileRecord> = Vec::new();
        let mut other_lint = Vec::new();

        // Step 1: insert, folding hardlinks and discarding path doubles.
        let mut by_inode: HashMap<(u64, u64), HardlinkCluster> = HashMap::new();
        let mut parents: FxHashMap<PathBuf, NodeId> = FxHashMap::default();

        for entry in entries {
            if !self.in_size_range(entry.metadata.size) {
                continue;
            }

            let mut lint = classify(&entry, self.config);
            let mut record = self.build_record(&entry, &mut parents, lint);

            // skip-start == skip-end (or a window that otherwise spans zero
            // bytes) leaves nothing to hash; drop it before the shredder
            // ever sees it instead of letting a zero-length read pass as a
            // trivial, always-matching duplicate.
            if !lint.is_other_lint() && record.effective_size == 0 {
                lint = LintKind::EmptyFile;
                record.lint_kind = lint;
            }

            if lint.is_other_lint() {
                let silently_dropped = (self.config.keep_all_tagged && record.flags.preferred_path)
                    || (self.config.keep_all_untagged && !record.flags.preferred_path);
                if !silently_dropped {
                    other_lint.push(record);
                }
                continue;
            }

            let key = (entry.metadata.dev, entry.metadata.inode);
            match by_inode.get_mut(&key) {
                None => {
                    let idx = records.len();
                    records.push(record);
                    by_inode.insert(key, HardlinkCluster { representative: idx, members: vec![idx] });
                }
                Some(cluster) => {
                    let existing = &records[cluster.representative];
                    if existing.basename == record.basename && existing.dir_path == record.dir_path {
                        // Path double: keep only the higher-ranked of the two.
                        if self.rank.compare(&record, existing) == std::cmp::Ordering::Less {
                            records[cluster.representative] = record;
                        }
                        continue;
                    }
                    let idx = records.len();
                    records.push(record);
                    cluster.members.push(idx);
                    if self.rank.compare(&records[idx], &records[cluster.representative]) == std::cmp::Ordering::Less {
                        cluster.representative = idx;
                    }
                }
            }
        }

        // Fold hardlink clusters: only the representative is a shredder
        // candidate unless `find-hardlinked-dupes` asks to treat members as
        // independent duplicates of each other.
        let mut assign_outer: Vec<u64> = vec![0; records.len()];
        let mut keep: Vec<bool> = vec![true; records.len()];
        for cluster in by_inode.values() {
            let outer = records[cluster.representative].link_count.saturating_sub(cluster.members.len() as u64);
            for &idx in &cluster.members {
                assign_outer[idx] = outer;
            }
            if cluster.members.len() > 1 {
                records[cluster.representative].hardlink_cluster =
                    Some(HardlinkClusterId(cluster.representative as u32));
            }
            if !self.config.find_hardlinked_dupes {
                for &idx in &cluster.members {
                    if idx != cluster.representative {
                        keep[idx] = false;
                    }
                }
            }
        }
        for (idx, rec) in records.iter_mut().enumerate() {
            rec.outer_link_count = assign_outer[idx];
        }
        let mut filtered: Vec<FileRecord> = records
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| keep[*idx])
            .map(|(_, r)| r)
            .collect();

        // Step 3+4: size grouping by composite key, then preferred-path
        // accounting and must-match filtering per group.
        filtered.sort_by(|a, b| self.group_key(a).cmp(&self.group_key(b)).then_with(|| self.rank.compare(a, b)));

        let mut groups: Vec<SizeGroup> = Vec::new();
        let mut iter = filtered.into_iter().peekable();
        while let Some(first) = iter.next() {
            let key = self.group_key(&first);
            let mut members = vec![first];
            while let Some(next) = iter.peek() {
                if self.group_key(next) == key {
                    members.push(iter.next().unwrap());
                } else {
                    break;
                }
            }
            if self.passes_must_match(&members) {
                groups.push(SizeGroup { effective_size: key.0, members });
            }
        }

        PreprocessOutcome { groups, other_lint }
    }

    fn in_size_range(&self, size: u64) -> bool {
        size >= self.config.min_size && size <= self.config.max_size
    }

    fn build_record(
        &self,
        entry: &TraversalEntry,
        parents: &mut FxHashMap<PathBuf, NodeId>,
        lint: LintKind,
    ) -> FileRecord {
        let parent_path = entry.path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
        let basename = entry.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

        let parent_node = *parents
            .entry(parent_path.clone())
            .or_insert_with(|| self.trie.intern_root(&parent_path.to_string_lossy()));

        // skip-start/skip-end bound the hashed *window* `[start, end)`,
        // not trim amounts off each end: an unset skip-end means "to EOF".
        let window_start = self.config.skip_start.map(|s| s.resolve(entry.metadata.size)).unwrap_or(0);
        let window_end = self.config.skip_end.map(|s| s.resolve(entry.metadata.size)).unwrap_or(entry.metadata.size);
        let effective_size = window_end.saturating_sub(window_start);

        FileRecord::new(FileRecordInit {
            parent: parent_node,
            basename: basename.into(),
            dir_path: parent_path.to_string_lossy().into_owned().into(),
            device: entry.metadata.dev,
            inode: entry.metadata.inode,
            link_count: entry.metadata.link_count,
            outer_link_count: 0,
            mtime: entry.metadata.mtime,
            size: entry.metadata.size,
            effective_size,
            window_start,
            flags: TaggedFlags {
                preferred_path: entry.preferred,
                hidden: entry.hidden,
                symlink: entry.metadata.is_symlink,
                new: false,
                cached_externally: false,
            },
            lint_kind: lint,
            depth: entry.depth,
            path_index: entry.path_index,
            regex_slots: 0,
        })
    }

    /// `(effective_size, basename?, extension?, extension-stripped?,
    /// mtime-window-bucket?)`. Files differing in any active component
    /// never join the same group.
    fn group_key(&self, record: &FileRecord) -> GroupKey {
        let mc = &self.config.match_criteria;
        GroupKey(
            record.effective_size,
            mc.match_basename.then(|| record.basename.to_string()),
            mc.match_extension.then(|| extension_of(&record.basename)),
            mc.match_without_extension.then(|| without_extension(&record.basename)),
            mc.mtime_window.map(|w| (record.mtime / w.max(1e-9)).floor() as i64),
        )
    }

    fn passes_must_match(&self, members: &[FileRecord]) -> bool {
        let has_preferred = members.iter().any(|r| r.flags.preferred_path);
        let has_nonpreferred = members.iter().any(|r| !r.flags.preferred_path);
        if self.config.must_match_tagged && !has_preferred {
            return false;
        }
        if self.config.must_match_untagged && !has_nonpreferred {
            return false;
        }
        true
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey(u64, Option<String>, Option<String>, Option<String>, Option<i64>);

fn extension_of(basename: &str) -> String {
    basename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()).unwrap_or_default()
}

fn without_extension(basename: &str) -> String {
    basename.rsplit_once('.').map(|(stem, _)| stem.to_string()).unwrap_or_else(|| basename.to_string())
}

/// Other-lint classification (spec section 4.4). Grounded on
/// `lib/preprocess.c`'s size/type checks: zero-size files and empty
/// directories are lint, not duplicate candidates, regardless of content.
fn classify(entry: &TraversalEntry, config: &Config) -> LintKind {
    if entry.metadata.is_dir {
        return LintKind::EmptyDir;
    }
    if entry.metadata.size == 0 {
        return LintKind::EmptyFile;
    }
    if entry.metadata.is_symlink && !config.follow_symlinks {
        return LintKind::BadLink;
    }
    LintKind::DuplicateCandidate
}
