//! Maps a file's logical offset to its physical offset on disk, used to
//! re-sort a rotational device's queue (spec section 4.1). On Linux this is
//! the `FIEMAP` ioctl; everywhere else (and on any FIEMAP failure) the
//! scheduler falls back to inode-number ordering, which this module
//! signals by returning `None`.

use std::fs::File;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

pub trait OffsetOracle: Send + Sync {
    fn physical_offset(&self, file: &File, logical_offset: u64) -> Option<u64>;
}

pub struct NullOffsetOracle;

impl OffsetOracle for NullOffsetOracle {
    fn physical_offset(&self, _file: &File, _logical_offset: u64) -> Option<u64> {
        None
    }
}

#[cfg(target_os = "linux")]
mod fiemap {
    use libc::{c_int, c_ulong};

    // From linux/fs.h / linux/fiemap.h.
    const FIEMAP_MAGIC: u8 = b'f';
    const FIEMAP_IOC_NR: u8 = 11;
    const FIEMAP_EXTENT_COUNT: u32 = 1;

    #[repr(C)]
    struct FiemapExtent {
        fe_logical: u64,
        fe_physical: u64,
        fe_length: u64,
        fe_reserved64: [u64; 2],
        fe_flags: u32,
        fe_reserved: [u32; 3],
    }

    #[repr(C)]
    struct Fiemap {
        fm_start: u64,
        fm_length: u64,
        fm_flags: u32,
        fm_mapped_extents: u32,
        fm_extent_count: u32,
        fm_reserved: u32,
        fm_extents: [FiemapExtent; FIEMAP_EXTENT_COUNT as usize],
    }

    fn fiemap_ioc_size() -> c_ulong {
        std::mem::size_of::<Fiemap>() as c_ulong
    }

    // _IOWR('f', 11, struct fiemap)
    fn request() -> c_ulong {
        let dir_write: c_ulong = 1;
        let dir_read: c_ulong = 2;
        let size = fiemap_ioc_size();
        (dir_write | dir_read) << 30
            | (size & 0x1fff) << 16
            | (FIEMAP_MAGIC as c_ulong) << 8
            | FIEMAP_IOC_NR as c_ulong
    }

    pub fn query(fd: c_int, logical_offset: u64) -> Option<u64> {
        let mut map = Fiemap {
            fm_start: logical_offset,
            fm_length: 1,
            fm_flags: 0,
            fm_mapped_extents: 0,
            fm_extent_count: FIEMAP_EXTENT_COUNT,
            fm_reserved: 0,
            fm_extents: [FiemapExtent {
                fe_logical: 0,
                fe_physical: 0,
                fe_length: 0,
                fe_reserved64: [0; 2],
                fe_flags: 0,
                fe_reserved: [0; 3],
            }],
        };

        let rc = unsafe { libc::ioctl(fd, request() as _, &mut map as *mut Fiemap) };
        if rc != 0 || map.fm_mapped_extents == 0 {
            return None;
        }
        let extent = &map.fm_extents[0];
        let delta = logical_offset.saturating_sub(extent.fe_logical);
        Some(extent.fe_physical + delta)
    }
}

#[cfg(target_os = "linux")]
pub struct LinuxOffsetOracle;

#[cfg(target_os = "linux")]
impl OffsetOracle for LinuxOffsetOracle {
    fn physical_offset(&self, file: &File, logical_offset: u64) -> Option<u64> {
        fiemap::query(file.as_raw_fd(), logical_offset)
    }
}

pub fn discover() -> Box<dyn OffsetOracle> {
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxOffsetOracle)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(NullOffsetOracle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_oracle_always_defers_to_inode_fallback() {
        let oracle = NullOffsetOracle;
        let f = tempfile::tempfile().unwrap();
        assert_eq!(oracle.physical_offset(&f, 0), None);
    }
}
