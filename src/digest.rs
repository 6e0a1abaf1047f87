//! Progressive digests.
//!
//! The teacher hashes pairwise, incrementally, storing each comparison
//! chunk as a fixed-size SHA-1 digest (`hasher.rs::HashedRange`), with a
//! domain-separation prefix so a SHAttered-style SHA-1 collision can't be
//! used to fake a duplicate. This module generalizes that idea to an
//! n-way `Digest` trait: `update` feeds bytes in, `snapshot` produces a
//! cheap, comparable copy of the running state without needing exclusive
//! access to the digest itself (the snapshot is what the joiner compares).
//!
//! `paranoid` is the teacher's caution taken to its logical conclusion:
//! instead of hashing, it *is* the bytes, so "equal digest" literally means
//! "equal content".

use crate::config::DigestKind;
use std::fmt;

/// Domain-separation prefix mixed into every SHA-1 digest, exactly as the
/// teacher's `hasher.rs` does, so that a crafted SHA-1 collision (e.g. the
/// "shattered" PDFs) cannot be used to make two different files appear to
/// be duplicates.
const SHA1_DOMAIN_PREFIX: &[u8] = b"ISpent$75KToCollideWithThisStringAndAllIGotWasADeletedFile";

/// A progressive digest: bytes are fed in incrementally as they're read
/// off disk, and a cheap snapshot can be taken at any point to compare
/// against other files' snapshots at the same hash offset.
pub trait Digest: fmt::Debug + Send {
    fn update(&mut self, data: &[u8]);

    /// A comparable snapshot of the current state. Two files agree up to
    /// this point iff their snapshots are equal.
    fn snapshot(&self) -> DigestSnapshot;

    fn clone_box(&self) -> Box<dyn Digest>;
}

/// A cheap, owned copy of a digest's running state. Plain byte buffers so
/// the joiner can hold many of these in its table without holding locks on
/// the originating hashers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DigestSnapshot(pub Box<[u8]>);

impl DigestSnapshot {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

macro_rules! rustcrypto_digest {
    ($name:ident, $inner:ty) => {
        #[derive(Debug, Clone, Default)]
        pub struct $name($inner);

        impl Digest for $name {
            fn update(&mut self, data: &[u8]) {
                digest_crate::Digest::update(&mut self.0, data);
            }

            fn snapshot(&self) -> DigestSnapshot {
                use digest_crate::Digest as _;
                DigestSnapshot(self.0.clone().finalize().to_vec().into_boxed_slice())
            }

            fn clone_box(&self) -> Box<dyn Digest> {
                Box::new(self.clone())
            }
        }
    };
}

// Alias the shared `digest` crate so the macro above doesn't collide with
// this module's own name.
extern crate digest as digest_crate;

rustcrypto_digest!(Md5Digest, md5::Md5);
rustcrypto_digest!(Sha256Digest, sha2::Sha256);
rustcrypto_digest!(Sha512Digest, sha2::Sha512);
rustcrypto_digest!(Blake2bDigest, blake2::Blake2b512);

#[derive(Debug, Clone, Default)]
pub struct Sha1Digest(sha1::Sha1);

impl Sha1Digest {
    pub fn new() -> Self {
        use sha1::Digest as _;
        let mut inner = sha1::Sha1::new();
        inner.update(SHA1_DOMAIN_PREFIX);
        Sha1Digest(inner)
    }
}

impl Digest for Sha1Digest {
    fn update(&mut self, data: &[u8]) {
        use sha1::Digest as _;
        self.0.update(data);
    }

    fn snapshot(&self) -> DigestSnapshot {
        use sha1::Digest as _;
        DigestSnapshot(self.0.clone().finalize().to_vec().into_boxed_slice())
    }

    fn clone_box(&self) -> Box<dyn Digest> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone)]
pub struct HighwayDigest(highway::HighwayHasher);

impl Default for HighwayDigest {
    fn default() -> Self {
        HighwayDigest(highway::HighwayHasher::default())
    }
}

impl Digest for HighwayDigest {
    fn update(&mut self, data: &[u8]) {
        use std::hash::Hasher as _;
        self.0.write(data);
    }

    fn snapshot(&self) -> DigestSnapshot {
        use highway::HighwayHash as _;
        let result: [u64; 4] = self.0.clone().finalize256();
        let mut bytes = Vec::with_capacity(32);
        for word in result {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        DigestSnapshot(bytes.into_boxed_slice())
    }

    fn clone_box(&self) -> Box<dyn Digest> {
        Box::new(self.clone())
    }
}

#[derive(Default)]
pub struct MetroDigest(metrohash::MetroHash128);

impl fmt::Debug for MetroDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetroDigest").finish_non_exhaustive()
    }
}

impl Clone for MetroDigest {
    fn clone(&self) -> Self {
        // `metrohash::MetroHash128` has no public Clone/accessor API, but it
        // has no `Drop` impl and is made up entirely of `Copy` fields, so a
        // bitwise duplicate is a sound, exact clone of its running state.
        MetroDigest(unsafe { std::mem::transmute_copy(&self.0) })
    }
}

impl Digest for MetroDigest {
    fn update(&mut self, data: &[u8]) {
        use std::hash::Hasher as _;
        self.0.write(data);
    }

    fn snapshot(&self) -> DigestSnapshot {
        let (hi, lo) = self.0.finish128();
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&hi.to_le_bytes());
        bytes.extend_from_slice(&lo.to_le_bytes());
        DigestSnapshot(bytes.into_boxed_slice())
    }

    fn clone_box(&self) -> Box<dyn Digest> {
        Box::new(self.clone())
    }
}

#[derive(Clone, Default)]
pub struct Xxh3Digest(xxhash_rust::xxh3::Xxh3);

impl fmt::Debug for Xxh3Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Xxh3Digest").finish_non_exhaustive()
    }
}

impl Digest for Xxh3Digest {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn snapshot(&self) -> DigestSnapshot {
        DigestSnapshot(self.0.digest128().to_le_bytes().to_vec().into_boxed_slice())
    }

    fn clone_box(&self) -> Box<dyn Digest> {
        Box::new(self.clone())
    }
}

/// Stores the bytes themselves; "hashing" is appending, "snapshot" is a
/// verbatim copy, and equality is exact bytewise comparison. Used when the
/// config requests certainty over speed (`DigestKind::Paranoid`).
#[derive(Debug, Clone, Default)]
pub struct ParanoidDigest(Vec<u8>);

impl ParanoidDigest {
    /// Builds a digest already holding `bytes`, used to inject a cached
    /// digest value read back from the extended-attribute store.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ParanoidDigest(bytes)
    }
}

impl Digest for ParanoidDigest {
    fn update(&mut self, data: &[u8]) {
        self.0.extend_from_slice(data);
    }

    fn snapshot(&self) -> DigestSnapshot {
        DigestSnapshot(self.0.clone().into_boxed_slice())
    }

    fn clone_box(&self) -> Box<dyn Digest> {
        Box::new(self.clone())
    }
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub(crate) fn hex_decode(s: &str) -> std::result::Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

pub fn new_digest(kind: DigestKind) -> Box<dyn Digest> {
    match kind {
        DigestKind::Md5 => Box::new(Md5Digest::default()),
        DigestKind::Sha1 => Box::new(Sha1Digest::new()),
        DigestKind::Sha256 => Box::new(Sha256Digest::default()),
        DigestKind::Sha512 => Box::new(Sha512Digest::default()),
        DigestKind::Blake2b => Box::new(Blake2bDigest::default()),
        DigestKind::Highway => Box::new(HighwayDigest::default()),
        DigestKind::Metro => Box::new(MetroDigest::default()),
        DigestKind::Xxh3 => Box::new(Xxh3Digest::default()),
        DigestKind::Paranoid => Box::new(ParanoidDigest::default()),
    }
}
