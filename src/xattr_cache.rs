//! The extended-attribute digest cache: lets a second run skip hashing
//! files that haven't changed since the last one (spec section 4.3,
//! "external-attribute cache", and section 6's persisted-state note). Two
//! attributes per file per digest algorithm: the hex digest and the
//! fractional mtime that produced it.
//!
//! Grounded on `lib/xattr.c`/`src/xattr.c` for the naming scheme and on
//! the `xattr` crate's usage in the oferchen-rsync pack for the Unix
//! binding itself; this core never touches any other metadata store.

use crate::config::DigestKind;

pub trait XattrStore: Send + Sync {
    /// Returns the cached `(digest_hex, mtime)` pair for `path` under the
    /// given algorithm, if any.
    fn read(&self, path: &str, kind: DigestKind) -> Option<(String, f64)>;
    fn write(&self, path: &str, kind: DigestKind, digest_hex: &str, mtime: f64);
    fn clear(&self, path: &str);
}

fn digest_attr_name(kind: DigestKind) -> &'static str {
    match kind {
        DigestKind::Md5 => "user.shred.md5",
        DigestKind::Sha1 => "user.shred.sha1",
        DigestKind::Sha256 => "user.shred.sha256",
        DigestKind::Sha512 => "user.shred.sha512",
        DigestKind::Blake2b => "user.shred.blake2b",
        DigestKind::Highway => "user.shred.highway",
        DigestKind::Metro => "user.shred.metro",
        DigestKind::Xxh3 => "user.shred.xxh3",
        DigestKind::Paranoid => "user.shred.paranoid",
    }
}

fn mtime_attr_name(kind: DigestKind) -> String {
    format!("{}.mtime", digest_attr_name(kind))
}

/// No-op store used when `ext-attr-read`/`ext-attr-write` are both off, or
/// on platforms without an xattr syscall.
pub struct NullXattrStore;

impl XattrStore for NullXattrStore {
    fn read(&self, _path: &str, _kind: DigestKind) -> Option<(String, f64)> {
        None
    }
    fn write(&self, _path: &str, _kind: DigestKind, _digest_hex: &str, _mtime: f64) {}
    fn clear(&self, _path: &str) {}
}

#[cfg(unix)]
pub struct UnixXattrStore;

#[cfg(unix)]
impl XattrStore for UnixXattrStore {
    fn read(&self, path: &str, kind: DigestKind) -> Option<(String, f64)> {
        let digest = xattr::get(path, digest_attr_name(kind)).ok().flatten()?;
        let mtime_raw = xattr::get(path, mtime_attr_name(kind)).ok().flatten()?;
        let digest_hex = String::from_utf8(digest).ok()?;
        let mtime = String::from_utf8(mtime_raw).ok()?.parse().ok()?;
        Some((digest_hex, mtime))
    }

    fn write(&self, path: &str, kind: DigestKind, digest_hex: &str, mtime: f64) {
        let _ = xattr::set(path, digest_attr_name(kind), digest_hex.as_bytes());
        let _ = xattr::set(path, &mtime_attr_name(kind), mtime.to_string().as_bytes());
    }

    fn clear(&self, path: &str) {
        for kind in [
            DigestKind::Md5,
            DigestKind::Sha1,
            DigestKind::Sha256,
            DigestKind::Sha512,
            DigestKind::Blake2b,
            DigestKind::Highway,
            DigestKind::Metro,
            DigestKind::Xxh3,
            DigestKind::Paranoid,
        ] {
            let _ = xattr::remove(path, digest_attr_name(kind));
            let _ = xattr::remove(path, &mtime_attr_name(kind));
        }
    }
}

pub fn discover(ext_attr_read: bool, ext_attr_write: bool) -> Box<dyn XattrStore> {
    if !ext_attr_read && !ext_attr_write {
        return Box::new(NullXattrStore);
    }
    #[cfg(unix)]
    {
        Box::new(UnixXattrStore)
    }
    #[cfg(not(unix))]
    {
        Box::new(NullXattrStore)
    }
}
