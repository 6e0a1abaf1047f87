//! End-to-end scenarios from the core's design document: traversal entries
//! in, duplicate groups (file and directory) out, through the real
//! preprocessor / shredder / tree-merger pipeline against files on disk.

use std::fs;
use std::path::{Path, PathBuf};

use shred_core::buffer_pool::BufferPool;
use shred_core::cancellation::CancellationToken;
use shred_core::config::{Config, DigestKind};
use shred_core::criteria::Criteria;
use shred_core::file_record::LintKind;
use shred_core::metadata::Metadata;
use shred_core::path_trie::PathTrie;
use shred_core::preprocessor::{Preprocessor, TraversalEntry};
use shred_core::shredder::{ShredOutcome, Shredder};
use shred_core::tree_merger::{self, TreeMerger};

fn entry_for(path: PathBuf, preferred: bool, path_index: u32) -> TraversalEntry {
    let metadata = Metadata::from_path(&path, false).unwrap();
    TraversalEntry {
        depth: path.components().count() as u32,
        preferred,
        hidden: false,
        path_index,
        path,
        metadata,
    }
}

/// Runs every size-equivalence group the preprocessor produces through the
/// shredder, in sequence (the tests don't need the disk scheduler's
/// parallelism to exercise pipeline correctness).
fn shred_all(config: &Config, rank: &Criteria, entries: Vec<TraversalEntry>) -> (Vec<Vec<shred_core::FileRecord>>, Vec<shred_core::FileRecord>, Vec<shred_core::FileRecord>) {
    let trie = PathTrie::new();
    let pre = Preprocessor::new(config, rank, &trie);
    let outcome = pre.run(entries);

    let pool = BufferPool::new(config.read_buffer_bytes, config.total_buffer_bytes);
    let cancel = CancellationToken::new();
    let shredder = Shredder::new(&pool, config.digest, rank, &cancel);

    let mut duplicates = Vec::new();
    let mut uniques = Vec::new();
    for group in outcome.groups {
        let ShredOutcome { duplicates: d, uniques: u } = shredder.shred_group(group.members);
        duplicates.extend(d);
        uniques.extend(u);
    }
    (duplicates, uniques, outcome.other_lint)
}

#[test]
fn scenario_1_identical_pair_among_a_near_miss() {
    let dir = tempfile::tempdir().unwrap();
    let content = vec![0x5au8; 1_000_000];
    let mut b_content = content.clone();
    b_content[500_000] ^= 0xff;

    fs::write(dir.path().join("a"), &content).unwrap();
    fs::write(dir.path().join("b"), &b_content).unwrap();
    fs::write(dir.path().join("c"), &content).unwrap();

    let mut config = Config::default();
    config.digest = DigestKind::Blake2b;
    let rank = Criteria::parse("a").unwrap();

    let entries = vec![
        entry_for(dir.path().join("a"), false, 0),
        entry_for(dir.path().join("b"), false, 0),
        entry_for(dir.path().join("c"), false, 0),
    ];
    let (duplicates, uniques, other_lint) = shred_all(&config, &rank, entries);

    assert!(other_lint.is_empty());
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].len(), 2);
    let names: Vec<&str> = duplicates[0].iter().map(|f| f.basename.as_ref()).collect();
    assert!(names.contains(&"a") && names.contains(&"c"));
    assert_eq!(uniques.len(), 1);
    assert_eq!(uniques[0].basename.as_ref(), "b");
}

#[test]
fn scenario_2_duplicate_directories_merge() {
    let root = tempfile::tempdir().unwrap();
    let dir1 = root.path().join("dir1");
    let dir2 = root.path().join("dir2");
    fs::create_dir(&dir1).unwrap();
    fs::create_dir(&dir2).unwrap();

    for dir in [&dir1, &dir2] {
        fs::write(dir.join("x"), b"hello\nfoo\n").unwrap();
        fs::write(dir.join("y"), b"z").unwrap();
    }

    let mut config = Config::default();
    config.merge_directories = true;
    let rank = Criteria::parse("a").unwrap();

    let entries = vec![
        entry_for(dir1.join("x"), false, 0),
        entry_for(dir1.join("y"), false, 0),
        entry_for(dir2.join("x"), false, 0),
        entry_for(dir2.join("y"), false, 0),
    ];
    let counts = tree_merger::pre_pass_counts(&entries, &[dir1.clone(), dir2.clone()]);

    let (duplicates, uniques, other_lint) = shred_all(&config, &rank, entries);
    assert!(other_lint.is_empty());
    assert!(uniques.is_empty());
    assert_eq!(duplicates.len(), 2, "x-pair and y-pair both confirmed duplicates");

    let mut merger = TreeMerger::new(counts, false, false);
    for group in duplicates {
        for file in group {
            merger.feed(file);
        }
    }
    let (groups, residuals) = merger.extract(&rank);

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].dirs.len(), 2);
    assert!(residuals.is_empty());
    let original_paths: Vec<&str> = groups[0].dirs.iter().filter(|d| d.original).map(|d| d.path.as_str()).collect();
    assert_eq!(original_paths.len(), 1);
    for dir in &groups[0].dirs {
        assert_eq!(dir.files.len(), 2);
    }
}

#[test]
fn scenario_3_preferred_path_must_match_tagged() {
    let root = tempfile::tempdir().unwrap();
    let p1 = root.path().join("p1");
    let p2 = root.path().join("p2");
    fs::create_dir(&p1).unwrap();
    fs::create_dir(&p2).unwrap();

    fs::write(p1.join("a"), vec![1u8; 1000]).unwrap();
    fs::write(p2.join("a"), vec![1u8; 1000]).unwrap();
    fs::write(p1.join("b"), vec![2u8; 2000]).unwrap();
    fs::write(p2.join("b"), vec![2u8; 2000]).unwrap();

    let mut config = Config::default();
    config.must_match_tagged = true;
    let rank = Criteria::parse("pM").unwrap();

    let entries = vec![
        entry_for(p1.join("a"), true, 0),
        entry_for(p1.join("b"), true, 0),
        entry_for(p2.join("a"), false, 1),
        entry_for(p2.join("b"), false, 1),
    ];
    let (duplicates, uniques, other_lint) = shred_all(&config, &rank, entries);

    assert!(other_lint.is_empty());
    assert!(uniques.is_empty());
    assert_eq!(duplicates.len(), 2);
    for group in &duplicates {
        let original = group.iter().find(|f| f.original).unwrap();
        assert_eq!(original.dir_path.as_ref(), p1.to_string_lossy().as_ref());
    }
}

#[test]
fn scenario_4_hardlink_cluster_plus_independent_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let h1 = dir.path().join("h1");
    let h2 = dir.path().join("h2");
    let h3 = dir.path().join("h3");
    let k = dir.path().join("k");

    fs::write(&h1, vec![3u8; 100]).unwrap();
    fs::hard_link(&h1, &h2).unwrap();
    fs::hard_link(&h1, &h3).unwrap();
    fs::write(&k, vec![3u8; 100]).unwrap();

    let config = Config::default();
    let rank = Criteria::parse("a").unwrap();

    let entries = vec![
        entry_for(h1.clone(), false, 0),
        entry_for(h2.clone(), false, 0),
        entry_for(h3.clone(), false, 0),
        entry_for(k.clone(), false, 0),
    ];
    let (duplicates, uniques, other_lint) = shred_all(&config, &rank, entries);

    assert!(other_lint.is_empty());
    assert!(uniques.is_empty());
    assert_eq!(duplicates.len(), 1, "hardlink cluster folds to one representative, dupes with k");
    assert_eq!(duplicates[0].len(), 2);
    assert!(duplicates[0].iter().any(|f| f.hardlink_cluster.is_some()));
}

#[test]
fn scenario_5_paranoid_near_miss_reports_unique_when_write_unfinished() {
    let dir = tempfile::tempdir().unwrap();
    let mut u_content = vec![7u8; 1_000_000];
    let mut v_content = u_content.clone();
    *v_content.last_mut().unwrap() ^= 1;
    fs::write(dir.path().join("u"), &u_content).unwrap();
    fs::write(dir.path().join("v"), &v_content).unwrap();
    u_content.clear();

    let mut config = Config::default();
    config.digest = DigestKind::Paranoid;
    config.write_unfinished = true;
    let rank = Criteria::parse("a").unwrap();

    let entries = vec![entry_for(dir.path().join("u"), false, 0), entry_for(dir.path().join("v"), false, 0)];
    let (duplicates, uniques, other_lint) = shred_all(&config, &rank, entries);

    assert!(other_lint.is_empty());
    assert!(duplicates.is_empty());
    assert_eq!(uniques.len(), 2);
}

#[test]
fn boundary_min_and_max_size_are_inclusive() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("small"), vec![1u8; 50]).unwrap();
    fs::write(dir.path().join("exact_min"), vec![1u8; 100]).unwrap();
    fs::write(dir.path().join("exact_max"), vec![1u8; 200]).unwrap();
    fs::write(dir.path().join("too_big"), vec![1u8; 201]).unwrap();

    let mut config = Config::default();
    config.min_size = 100;
    config.max_size = 200;
    let rank = Criteria::parse("a").unwrap();

    let entries = vec![
        entry_for(dir.path().join("small"), false, 0),
        entry_for(dir.path().join("exact_min"), false, 0),
        entry_for(dir.path().join("exact_max"), false, 0),
        entry_for(dir.path().join("too_big"), false, 0),
    ];
    let (duplicates, uniques, other_lint) = shred_all(&config, &rank, entries);
    assert!(duplicates.is_empty());
    assert!(other_lint.is_empty());
    let names: Vec<&str> = uniques.iter().map(|f| f.basename.as_ref()).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"exact_min") && names.contains(&"exact_max"));
}

#[test]
fn boundary_empty_file_never_enters_the_shredder() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("empty"), b"").unwrap();

    let config = Config::default();
    let rank = Criteria::parse("a").unwrap();
    let entries = vec![entry_for(dir.path().join("empty"), false, 0)];
    let (duplicates, uniques, other_lint) = shred_all(&config, &rank, entries);

    assert!(duplicates.is_empty());
    assert!(uniques.is_empty());
    assert_eq!(other_lint.len(), 1);
    assert!(matches!(other_lint[0].lint_kind, LintKind::EmptyFile));
}
