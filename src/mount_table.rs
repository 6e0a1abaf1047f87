//! Resolves a file's device to a physical disk and tells the scheduler
//! whether that disk is rotational. Grounded on `src/mounttable.h`'s
//! `RmMountTable` (`rm_mounts_get_disk_id`, `rm_mounts_is_nonrotational`):
//! a partition-to-whole-disk table built once from the mount list, plus a
//! per-disk rotational flag read from sysfs.
//!
//! This is inherently platform-specific; only Linux gets a real
//! implementation (`/proc/mounts` plus `/sys/block/*/queue/rotational`).
//! Other platforms, and any failure to read those files, fall back to a
//! single synthetic device per the disk scheduler's failure semantics in
//! spec section 4.1.

use std::collections::HashMap;

pub trait MountTableOracle: Send + Sync {
    fn disk_of(&self, dev: u64) -> u64;
    fn is_rotational(&self, disk: u64) -> bool;
    /// Pseudo filesystems (tmpfs, proc, cgroup, ...) whose files should be
    /// skipped entirely.
    fn is_evil(&self, dev: u64) -> bool;
}

/// Every device maps to one synthetic disk, assumed rotational. Used when
/// mount-table discovery fails or isn't implemented for the platform.
pub struct SyntheticMountTable;

impl MountTableOracle for SyntheticMountTable {
    fn disk_of(&self, _dev: u64) -> u64 {
        0
    }
    fn is_rotational(&self, _disk: u64) -> bool {
        true
    }
    fn is_evil(&self, _dev: u64) -> bool {
        false
    }
}

const EVIL_FILESYSTEMS: &[&str] =
    &["proc", "sysfs", "tmpfs", "devtmpfs", "cgroup", "cgroup2", "devpts", "debugfs", "pstore"];

#[cfg(target_os = "linux")]
pub struct LinuxMountTable {
    /// partition dev_t -> whole-disk dev_t
    disk_of: HashMap<u64, u64>,
    rotational: HashMap<u64, bool>,
    evil: HashMap<u64, bool>,
}

#[cfg(target_os = "linux")]
impl LinuxMountTable {
    pub fn discover() -> Self {
        Self::from_mounts("/proc/mounts").unwrap_or_else(|| LinuxMountTable {
            disk_of: HashMap::new(),
            rotational: HashMap::new(),
            evil: HashMap::new(),
        })
    }

    fn from_mounts(path: &str) -> Option<Self> {
        let contents = std::fs::read_to_string(path).ok()?;
        let mut disk_of = HashMap::new();
        let mut rotational = HashMap::new();
        let mut evil = HashMap::new();

        for line in contents.lines() {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let mount_point = match fields.next() {
                Some(m) => m,
                None => continue,
            };
            let fs_type = fields.next().unwrap_or("");

            let dev = match stat_dev(mount_point) {
                Some(d) => d,
                None => continue,
            };

            if EVIL_FILESYSTEMS.contains(&fs_type) {
                evil.insert(dev, true);
                continue;
            }

            let disk_name = whole_disk_name(source);
            // The partition's own dev_t stands in for the whole-disk id;
            // resolving the real block-device parent would need a
            // `/sys/dev/block/<maj>:<min>` symlink walk, which is more
            // platform detail than the scheduler needs to pick a queue.
            let disk_id = dev;
            disk_of.insert(dev, disk_id);

            let is_rot = disk_name.as_deref().map(is_rotational_sysfs).unwrap_or(true);
            rotational.insert(disk_id, is_rot);
        }

        Some(LinuxMountTable { disk_of, rotational, evil })
    }
}

#[cfg(target_os = "linux")]
fn stat_dev(path: &str) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).ok().map(|m| m.dev())
}

/// Strips a partition suffix from a block device path, e.g.
/// `/dev/sda1` -> `sda`, `/dev/nvme0n1p2` -> `nvme0n1`. Returns `None` for
/// non-device sources (network shares, bind mounts, pseudo filesystems).
#[cfg(target_os = "linux")]
fn whole_disk_name(source: &str) -> Option<String> {
    let name = source.strip_prefix("/dev/")?;
    if let Some(base) = name.strip_suffix(|c: char| c.is_ascii_digit()) {
        if let Some(stripped) = base.strip_suffix('p') {
            if stripped.ends_with(|c: char| c.is_ascii_digit()) {
                return Some(stripped.to_string());
            }
        }
        let trimmed = name.trim_end_matches(|c: char| c.is_ascii_digit());
        return Some(trimmed.to_string());
    }
    Some(name.to_string())
}

#[cfg(target_os = "linux")]
fn is_rotational_sysfs(disk_name: &str) -> bool {
    let path = format!("/sys/block/{disk_name}/queue/rotational");
    std::fs::read_to_string(path).ok().map(|s| s.trim() == "1").unwrap_or(true)
}

#[cfg(target_os = "linux")]
impl MountTableOracle for LinuxMountTable {
    fn disk_of(&self, dev: u64) -> u64 {
        *self.disk_of.get(&dev).unwrap_or(&dev)
    }
    fn is_rotational(&self, disk: u64) -> bool {
        *self.rotational.get(&disk).unwrap_or(&true)
    }
    fn is_evil(&self, dev: u64) -> bool {
        *self.evil.get(&dev).unwrap_or(&false)
    }
}

/// Builds the best mount table available for the running platform,
/// degrading to the synthetic single-disk table per spec section 4.1's
/// failure semantics.
pub fn discover() -> Box<dyn MountTableOracle> {
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxMountTable::discover())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(SyntheticMountTable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_table_treats_everything_as_one_rotational_disk() {
        let table = SyntheticMountTable;
        assert_eq!(table.disk_of(5), table.disk_of(9));
        assert!(table.is_rotational(table.disk_of(5)));
        assert!(!table.is_evil(5));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn whole_disk_name_strips_partition_suffix() {
        assert_eq!(whole_disk_name("/dev/sda1").as_deref(), Some("sda"));
        assert_eq!(whole_disk_name("/dev/nvme0n1p2").as_deref(), Some("nvme0n1"));
        assert_eq!(whole_disk_name("tmpfs"), None);
    }
}
