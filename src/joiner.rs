//! The joiner: re-partitions a shred group once every member has published
//! a snapshot at the group's current hash offset (spec section 4.3, steps
//! 3-4). Kept as a pure function over owned entries rather than a
//! long-lived thread with a channel -- the shredder drives one group's
//! round synchronously and calls this once per round, but the entries and
//! ordering are exactly what a dedicated joiner thread would see arrive
//! over the bounded FIFO described in spec section 5.

use crate::digest::DigestSnapshot;

/// One file's progress report at a given `(effective_size, hash_offset)`
/// key. `member` indexes back into the shred group's member list.
#[derive(Debug, Clone)]
pub struct JoinEntry {
    pub member: usize,
    pub device: u64,
    pub inode: u64,
    pub path_index: u32,
    pub snapshot: DigestSnapshot,
}

/// Splits a round's entries into sub-groups of equal digest. Within a
/// sub-group, entries are ordered by the tie-break rule in spec section
/// 4.3: lower device id, then lower inode, then lower path index first, so
/// output order is reproducible across runs.
pub fn partition_by_digest(mut entries: Vec<JoinEntry>) -> Vec<Vec<JoinEntry>> {
    entries.sort_by(|a, b| {
        a.snapshot
            .cmp(&b.snapshot)
            .then(a.device.cmp(&b.device))
            .then(a.inode.cmp(&b.inode))
            .then(a.path_index.cmp(&b.path_index))
    });

    let mut groups: Vec<Vec<JoinEntry>> = Vec::new();
    for entry in entries {
        match groups.last_mut() {
            Some(last) if last[0].snapshot == entry.snapshot => last.push(entry),
            _ => groups.push(vec![entry]),
        }
    }
    groups
}
