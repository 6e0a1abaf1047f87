//! The progressive shredder (spec section 4.3): advances a group of
//! same-size files in lockstep, splitting it the moment any member's hash
//! diverges, until each resulting group is either a singleton (unique) or
//! fully hashed (a confirmed duplicate set).
//!
//! Grounded on the teacher's `hasher.rs::HashIter`, which does the same
//! thing pairwise with a doubling chunk size; this generalizes the
//! doubling-chunk idea to n-way groups via the joiner in `joiner.rs`, and
//! replaces the fixed SHA-1 range with the `Digest` trait from
//! `digest.rs`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::buffer_pool::BufferPool;
use crate::cancellation::CancellationToken;
use crate::config::DigestKind;
use crate::criteria::Criteria;
use crate::digest::{hex_decode, hex_encode, new_digest};
use crate::error::{Result, ShredError};
use crate::file_record::{FileRecord, LintKind};
use crate::joiner::{partition_by_digest, JoinEntry};
use crate::xattr_cache::XattrStore;

use log::{debug, trace};

const BASE_INCREMENT: u64 = 4096;
const MAX_INCREMENT: u64 = 128 * 1024 * 1024;

pub struct ShredOutcome {
    /// Each inner vec is a confirmed duplicate set, original first.
    pub duplicates: Vec<Vec<FileRecord>>,
    /// Files that turned out unique (no byte-identical peer in the group).
    pub uniques: Vec<FileRecord>,
}

pub struct Shredder<'a> {
    pub buffer_pool: &'a BufferPool,
    pub digest_kind: DigestKind,
    pub rank: &'a Criteria,
    pub cancel: &'a CancellationToken,
    pub xattr: Option<&'a dyn XattrStore>,
    pub read_increment_max: u64,
}

impl<'a> Shredder<'a> {
    pub fn new(buffer_pool: &'a BufferPool, digest_kind: DigestKind, rank: &'a Criteria, cancel: &'a CancellationToken) -> Self {
        Shredder { buffer_pool, digest_kind, rank, cancel, xattr: None, read_increment_max: MAX_INCREMENT }
    }

    pub fn with_xattr(mut self, store: &'a dyn XattrStore) -> Self {
        self.xattr = Some(store);
        self
    }

    /// Runs one size-equivalence group to completion, returning every
    /// confirmed duplicate set and every file that ended up unique.
    pub fn shred_group(&self, members: Vec<FileRecord>) -> ShredOutcome {
        let mut outcome = ShredOutcome { duplicates: Vec::new(), uniques: Vec::new() };
        self.shred_recursive(members, &mut outcome);
        outcome
    }

    fn shred_recursive(&self, mut members: Vec<FileRecord>, outcome: &mut ShredOutcome) {
        if members.len() < 2 {
            outcome.uniques.extend(members);
            return;
        }

        for f in &mut members {
            if f.digest.is_none() {
                f.digest = Some(new_digest(self.digest_kind));
            }
        }

        if let Some(store) = self.xattr {
            self.apply_cache(&mut members, store);
        }

        let mut increment = BASE_INCREMENT;

        loop {
            if self.cancel.is_hard() {
                outcome.uniques.extend(members);
                return;
            }

            let mut entries = Vec::with_capacity(members.len());
            let mut failed = Vec::new();

            for (idx, f) in members.iter_mut().enumerate() {
                if f.hash_offset < f.effective_size {
                    let to_read = increment.min(f.effective_size - f.hash_offset);
                    match read_chunk(f, to_read, self.buffer_pool) {
                        Ok(()) => {}
                        Err(_) => {
                            f.lint_kind = LintKind::Unknown;
                            failed.push(idx);
                            continue;
                        }
                    }
                }
                f.check_offset_invariant();
                entries.push(JoinEntry {
                    member: idx,
                    device: f.device,
                    inode: f.inode,
                    path_index: f.path_index,
                    snapshot: f.digest.as_ref().unwrap().snapshot(),
                });
            }

            for idx in failed.into_iter().rev() {
                let dropped = members.remove(idx);
                outcome.uniques.push(dropped);
                entries.retain(|e| e.member != idx);
                for e in entries.iter_mut() {
                    if e.member > idx {
                        e.member -= 1;
                    }
                }
            }

            if members.len() < 2 {
                outcome.uniques.extend(members);
                return;
            }

            let groups = partition_by_digest(entries);
            let at_eof = members[0].hash_offset >= members[0].effective_size;

            if groups.len() == 1 {
                if at_eof {
                    if let Some(store) = self.xattr {
                        self.write_back(&members, store);
                    }
                    outcome.duplicates.push(self.finish(members));
                    return;
                }
                increment = (increment * 2).min(self.read_increment_max);
                continue;
            }

            // Split: rebuild member vecs per joiner partition, preserving
            // each file's digest/offset state, and recurse on each.
            debug!("group diverged at offset {} into {} partitions", members[0].hash_offset, groups.len());
            let mut by_index: Vec<Option<FileRecord>> = members.into_iter().map(Some).collect();
            for group in groups {
                let mut child = Vec::with_capacity(group.len());
                for entry in group {
                    if let Some(f) = by_index[entry.member].take() {
                        child.push(f);
                    }
                }
                self.shred_recursive(child, outcome);
            }
            return;
        }
    }

    /// Consults the ext-attr cache; any member whose cached digest matches
    /// its current mtime gets its full hash injected and `hash_offset` set
    /// to `effective_size` immediately, skipping all reads for it (spec
    /// section 4.3, "external-attribute cache").
    fn apply_cache(&self, members: &mut [FileRecord], store: &dyn XattrStore) {
        for f in members.iter_mut() {
            if let Some((digest_hex, cached_mtime)) = store.read(f.path(), self.digest_kind) {
                if (cached_mtime - f.mtime).abs() < 0.000_001 {
                    if let Ok(bytes) = hex_decode(&digest_hex) {
                        trace!("xattr cache hit: {}", f.path());
                        f.hash_offset = f.effective_size;
                        f.seek_offset = f.effective_size;
                        f.flags.cached_externally = true;
                        // Re-point the digest at a snapshot holding exactly
                        // the cached bytes so later comparisons are exact.
                        f.digest = Some(Box::new(crate::digest::ParanoidDigest::from_bytes(bytes)));
                    } else {
                        store.clear(f.path());
                    }
                } else {
                    trace!("xattr cache stale (mtime changed): {}", f.path());
                    store.clear(f.path());
                }
            }
        }
    }

    fn write_back(&self, members: &[FileRecord], store: &dyn XattrStore) {
        for f in members {
            if f.flags.cached_externally {
                continue;
            }
            let snapshot = f.digest.as_ref().unwrap().snapshot();
            store.write(f.path(), self.digest_kind, &hex_encode(snapshot.as_bytes()), f.mtime);
        }
    }

    fn finish(&self, mut members: Vec<FileRecord>) -> Vec<FileRecord> {
        members.sort_by(|a, b| self.rank.compare(a, b));
        for (i, f) in members.iter_mut().enumerate() {
            f.original = i == 0;
            f.lint_kind = LintKind::DuplicateCandidate;
        }
        members
    }
}

fn read_chunk(file: &mut FileRecord, len: u64, pool: &BufferPool) -> Result<()> {
    let path = file.path().to_string();
    let mut handle = File::open(&path).map_err(|e| ShredError::io(path.clone(), e))?;
    handle
        .seek(SeekFrom::Start(file.window_start + file.seek_offset))
        .map_err(|e| ShredError::io(path.clone(), e))?;

    let mut buf = pool.acquire();
    buf.resize(len as usize, 0);
    let mut read_total = 0usize;
    while read_total < buf.len() {
        let n = handle.read(&mut buf[read_total..]).map_err(|e| ShredError::io(path.clone(), e))?;
        if n == 0 {
            break;
        }
        read_total += n;
    }
    buf.truncate(read_total);

    file.digest.as_mut().unwrap().update(&buf);
    file.hash_offset += read_total as u64;
    file.seek_offset = file.hash_offset;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Criteria;
    use crate::file_record::FileRecordInit;
    use crate::path_trie::PathTrie;
    use std::io::Write;

    fn write_file(dir: &std::path::Path, name: &str, contents: &[u8]) -> FileRecord {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        drop(f);

        let trie = PathTrie::new();
        let root = trie.intern_root(dir.to_str().unwrap());

        FileRecord::new(FileRecordInit {
            parent: root,
            basename: name.into(),
            dir_path: dir.to_string_lossy().into_owned().into(),
            device: 1,
            inode: rand_inode(),
            link_count: 1,
            outer_link_count: 0,
            mtime: 0.0,
            size: contents.len() as u64,
            effective_size: contents.len() as u64,
            window_start: 0,
            flags: Default::default(),
            lint_kind: LintKind::DuplicateCandidate,
            depth: 1,
            path_index: 0,
            regex_slots: 0,
        })
    }

    fn rand_inode() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NEXT.fetch_add(1, Ordering::Relaxed)
    }

    #[test]
    fn identical_pair_confirmed_as_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a", &[7u8; 10_000]);
        let b = write_file(dir.path(), "b", &[7u8; 10_000]);

        let pool = BufferPool::new(4096, 1024 * 1024);
        let cancel = CancellationToken::new();
        let rank = Criteria::parse("a").unwrap();
        let shredder = Shredder::new(&pool, DigestKind::Sha256, &rank, &cancel);

        let outcome = shredder.shred_group(vec![a, b]);
        assert_eq!(outcome.duplicates.len(), 1);
        assert!(outcome.uniques.is_empty());
        assert_eq!(outcome.duplicates[0].len(), 2);
        assert!(outcome.duplicates[0].iter().filter(|f| f.original).count() == 1);
    }

    #[test]
    fn diverging_pair_both_reported_unique() {
        let dir = tempfile::tempdir().unwrap();
        let mut content_a = vec![1u8; 10_000];
        let mut content_b = content_a.clone();
        content_b[5000] = 2;
        let a = write_file(dir.path(), "a", &content_a);
        let b = write_file(dir.path(), "b", &content_b);
        content_a.clear();

        let pool = BufferPool::new(4096, 1024 * 1024);
        let cancel = CancellationToken::new();
        let rank = Criteria::parse("a").unwrap();
        let shredder = Shredder::new(&pool, DigestKind::Sha256, &rank, &cancel);

        let outcome = shredder.shred_group(vec![a, b]);
        assert!(outcome.duplicates.is_empty());
        assert_eq!(outcome.uniques.len(), 2);
    }

    #[test]
    fn triple_with_one_outlier_splits_into_pair_and_unique() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a", &[9u8; 1_000_000]);
        let mut diff = vec![9u8; 1_000_000];
        diff[500_000] = 8;
        let b = write_file(dir.path(), "b", &diff);
        let c = write_file(dir.path(), "c", &[9u8; 1_000_000]);

        let pool = BufferPool::new(65536, 8 * 1024 * 1024);
        let cancel = CancellationToken::new();
        let rank = Criteria::parse("a").unwrap();
        let shredder = Shredder::new(&pool, DigestKind::Blake2b, &rank, &cancel);

        let outcome = shredder.shred_group(vec![a, b, c]);
        assert_eq!(outcome.duplicates.len(), 1);
        assert_eq!(outcome.duplicates[0].len(), 2);
        assert_eq!(outcome.uniques.len(), 1);
        assert_eq!(outcome.uniques[0].basename.as_ref(), "b");
    }

    #[test]
    fn hashing_starts_at_window_start_not_file_start() {
        let dir = tempfile::tempdir().unwrap();
        // Differ only in the first 10 bytes, which a skip-start window
        // excludes from hashing, so the files agree on everything read.
        let mut content_a = vec![5u8; 1000];
        let mut content_b = content_a.clone();
        content_a[..10].copy_from_slice(&[1u8; 10]);
        content_b[..10].copy_from_slice(&[2u8; 10]);
        let mut a = write_file(dir.path(), "a", &content_a);
        let mut b = write_file(dir.path(), "b", &content_b);
        a.window_start = 10;
        a.effective_size = 990;
        b.window_start = 10;
        b.effective_size = 990;

        let pool = BufferPool::new(4096, 1024 * 1024);
        let cancel = CancellationToken::new();
        let rank = Criteria::parse("a").unwrap();
        let shredder = Shredder::new(&pool, DigestKind::Sha256, &rank, &cancel);

        let outcome = shredder.shred_group(vec![a, b]);
        assert_eq!(outcome.duplicates.len(), 1);
        assert!(outcome.uniques.is_empty());
    }
}
