//! The output sink (spec section 6): where finished results go. Generalizes
//! the teacher's `scanner.rs::ScanListener`/`Stats` pair -- there, a
//! listener gets `file_scanned`/`hardlinked`/`reflinked`/`duplicate_found`
//! callbacks plus a running `Stats` snapshot; here, a sink gets one emission
//! per finished item, each already tagged with its lint kind, and duplicate
//! groups are emitted original-first with the group's file/byte totals
//! attached so the sink never has to reconstruct them.

use crate::file_record::{FileRecord, LintKind};
use crate::tree_merger::DuplicateDirGroup;

/// Size of a finished group, attached to every member's emission so a sink
/// doesn't need to buffer the whole group to report a total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSize {
    pub files: usize,
    pub bytes: u64,
}

/// One duplicate, with its position in the (already original-first sorted)
/// group it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateSlot {
    pub is_original: bool,
    pub group: GroupSize,
}

/// Consumes finished results. Emission is strictly sequential -- one call
/// per item, original before its duplicates within a group -- so
/// implementations never need interior synchronization (spec section 6:
/// "the sink need not be thread-safe").
pub trait OutputSink {
    /// A record that never reached the shredder, or that did and turned out
    /// unique -- tagged with why (spec section 3's lint kinds).
    fn lint(&mut self, record: &FileRecord, kind: LintKind);

    /// One member of a confirmed duplicate-file group. Called original
    /// first, then each duplicate, for every group.
    fn duplicate_file(&mut self, record: &FileRecord, slot: DuplicateSlot);

    /// One member of a confirmed duplicate-directory group (tree merger
    /// output). `files` are every file under that directory, already
    /// tagged `LintKind::PartOfDirectory` by the caller.
    fn duplicate_dir(&mut self, dir_path: &str, is_original: bool, group: GroupSize, files: &[FileRecord]);

    /// Called once, after every other emission, so a sink can flush
    /// buffered output or print a summary.
    fn finished(&mut self) {}
}

/// Drops everything. Used when a caller only wants the return values of the
/// pipeline and has no interest in a streaming report.
#[derive(Debug, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn lint(&mut self, _record: &FileRecord, _kind: LintKind) {}
    fn duplicate_file(&mut self, _record: &FileRecord, _slot: DuplicateSlot) {}
    fn duplicate_dir(&mut self, _dir_path: &str, _is_original: bool, _group: GroupSize, _files: &[FileRecord]) {}
}

/// Walks a confirmed duplicate-file group (original first, as `shredder.rs`
/// leaves it) and emits each member with its group totals attached.
pub fn emit_duplicate_group(sink: &mut dyn OutputSink, members: &[FileRecord]) {
    let group = GroupSize { files: members.len(), bytes: members.iter().map(|f| f.size).sum() };
    for member in members {
        sink.duplicate_file(member, DuplicateSlot { is_original: member.original, group });
    }
}

/// Walks a confirmed duplicate-directory group (tree merger output),
/// original directory first, tagging every contained file
/// `LintKind::PartOfDirectory` before emission.
pub fn emit_duplicate_dir_group(sink: &mut dyn OutputSink, group: &mut DuplicateDirGroup) {
    let total_files: usize = group.dirs.iter().map(|d| d.files.len()).sum();
    let total_bytes: u64 = group.dirs.iter().flat_map(|d| d.files.iter()).map(|f| f.size).sum();
    let size = GroupSize { files: total_files, bytes: total_bytes };
    for dir in &mut group.dirs {
        for file in &mut dir.files {
            file.lint_kind = LintKind::PartOfDirectory;
        }
        sink.duplicate_dir(&dir.path, dir.original, size, &dir.files);
    }
}

/// Emits every other-lint record and every unique file from a finished
/// size-equivalence group or preprocessor pass.
pub fn emit_lint_records<'a>(sink: &mut dyn OutputSink, records: impl IntoIterator<Item = &'a FileRecord>) {
    for record in records {
        sink.lint(record, record.lint_kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_record::{FileRecordInit, TaggedFlags};
    use crate::path_trie::PathTrie;

    fn record(name: &str, size: u64, original: bool) -> FileRecord {
        let trie = PathTrie::new();
        let root = trie.intern_root("/d");
        let mut r = FileRecord::new(FileRecordInit {
            parent: root,
            basename: name.into(),
            dir_path: "/d".into(),
            device: 1,
            inode: 1,
            link_count: 1,
            outer_link_count: 0,
            mtime: 0.0,
            size,
            effective_size: size,
            window_start: 0,
            flags: TaggedFlags::default(),
            lint_kind: LintKind::DuplicateCandidate,
            depth: 1,
            path_index: 0,
            regex_slots: 0,
        });
        r.original = original;
        r
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<(String, bool, usize, u64)>,
    }

    impl OutputSink for RecordingSink {
        fn lint(&mut self, record: &FileRecord, _kind: LintKind) {
            self.calls.push((record.basename.to_string(), false, 0, 0));
        }
        fn duplicate_file(&mut self, record: &FileRecord, slot: DuplicateSlot) {
            self.calls.push((record.basename.to_string(), slot.is_original, slot.group.files, slot.group.bytes));
        }
        fn duplicate_dir(&mut self, dir_path: &str, is_original: bool, group: GroupSize, _files: &[FileRecord]) {
            self.calls.push((dir_path.to_string(), is_original, group.files, group.bytes));
        }
    }

    #[test]
    fn emits_original_first_with_group_totals() {
        let members = vec![record("a", 100, true), record("b", 100, false), record("c", 100, false)];
        let mut sink = RecordingSink::default();
        emit_duplicate_group(&mut sink, &members);

        assert_eq!(sink.calls.len(), 3);
        assert_eq!(sink.calls[0], ("a".to_string(), true, 3, 300));
        assert_eq!(sink.calls[1], ("b".to_string(), false, 3, 300));
        assert_eq!(sink.calls[2], ("c".to_string(), false, 3, 300));
    }

    #[test]
    fn lint_records_pass_through_their_kind() {
        let mut empty = record("empty", 0, false);
        empty.lint_kind = LintKind::EmptyFile;
        let mut sink = RecordingSink::default();
        emit_lint_records(&mut sink, std::iter::once(&empty));
        assert_eq!(sink.calls.len(), 1);
    }

    #[test]
    fn duplicate_dir_group_tags_contained_files_part_of_directory() {
        use crate::tree_merger::{DirectoryReport, DuplicateDirGroup};

        let mut group = DuplicateDirGroup {
            dirs: vec![
                DirectoryReport { path: "/a".into(), files: vec![record("x", 10, true)], original: true },
                DirectoryReport { path: "/b".into(), files: vec![record("x", 10, false)], original: false },
            ],
        };
        let mut sink = RecordingSink::default();
        emit_duplicate_dir_group(&mut sink, &mut group);

        assert_eq!(sink.calls.len(), 2);
        for dir in &group.dirs {
            for file in &dir.files {
                assert!(matches!(file.lint_kind, LintKind::PartOfDirectory));
            }
        }
    }
}
