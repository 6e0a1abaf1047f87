//! The configuration *value* consumed by the core. Loading it from argv,
//! environment variables, or a config file is the embedding application's
//! job (spec section 1, "out of scope"); this module only defines the
//! shape and validates internal consistency (spec section 7,
//! "Configuration" error class).

use crate::criteria::Criteria;
use crate::error::{Result, ShredError};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DigestKind {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Blake2b,
    Highway,
    Metro,
    Xxh3,
    /// Stores bytes verbatim; equality is exact bytewise comparison.
    Paranoid,
}

impl Default for DigestKind {
    fn default() -> Self {
        DigestKind::Highway
    }
}

/// A byte offset expressed either absolutely or as a fraction of the
/// file's size, as spec section 6 allows for `skip-start`/`skip-end`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SizeOffset {
    Bytes(u64),
    Fraction(f64),
}

impl SizeOffset {
    pub fn resolve(self, file_size: u64) -> u64 {
        match self {
            SizeOffset::Bytes(b) => b.min(file_size),
            SizeOffset::Fraction(f) => {
                let f = f.clamp(0.0, 1.0);
                (file_size as f64 * f) as u64
            }
        }
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct MatchCriteria {
    pub match_basename: bool,
    pub match_extension: bool,
    pub match_without_extension: bool,
    pub unmatched_basename: bool,
    /// Files whose modification times differ by more than this many
    /// seconds never join the same size-equivalence group.
    pub mtime_window: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub min_size: u64,
    pub max_size: u64,

    pub skip_start: Option<SizeOffset>,
    pub skip_end: Option<SizeOffset>,

    pub read_buffer_bytes: usize,
    pub total_buffer_bytes: usize,
    pub paranoid_buffer_bytes: usize,

    pub threads: usize,
    pub threads_per_disk: usize,

    pub digest: DigestKind,

    pub follow_symlinks: bool,
    pub cross_device: bool,

    pub find_hardlinked_dupes: bool,

    pub match_criteria: MatchCriteria,

    pub keep_all_tagged: bool,
    pub keep_all_untagged: bool,
    pub must_match_tagged: bool,
    pub must_match_untagged: bool,

    pub merge_directories: bool,
    pub honour_dir_layout: bool,

    pub rank_by: Criteria,

    pub ext_attr_read: bool,
    pub ext_attr_write: bool,
    pub ext_attr_clear: bool,

    /// Directories that are hidden at the top level of a reported
    /// duplicate-directory group are dropped from the report.
    pub filter_hidden_dir_groups: bool,

    /// If a singleton shred group should still be reported (as unique)
    /// rather than silently discarded. See scenario 5 in spec section 8.
    pub write_unfinished: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_size: 0,
            max_size: u64::MAX,
            skip_start: None,
            skip_end: None,
            read_buffer_bytes: 1024 * 1024,
            total_buffer_bytes: 256 * 1024 * 1024,
            paranoid_buffer_bytes: 256 * 1024 * 1024,
            threads: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            threads_per_disk: 1,
            digest: DigestKind::default(),
            follow_symlinks: false,
            cross_device: false,
            find_hardlinked_dupes: false,
            match_criteria: MatchCriteria::default(),
            keep_all_tagged: false,
            keep_all_untagged: false,
            must_match_tagged: false,
            must_match_untagged: false,
            merge_directories: false,
            honour_dir_layout: false,
            rank_by: Criteria::default(),
            ext_attr_read: false,
            ext_attr_write: false,
            ext_attr_clear: false,
            filter_hidden_dir_groups: false,
            write_unfinished: false,
        }
    }
}

impl Config {
    /// Rejects impossible flag combinations before a run starts, per the
    /// "Configuration" error class in spec section 7.
    pub fn validate(&self) -> Result<()> {
        if self.keep_all_tagged && self.must_match_untagged {
            return Err(ShredError::Config(
                "keep-all-tagged cannot be combined with must-match-untagged".into(),
            ));
        }
        if self.keep_all_untagged && self.must_match_tagged {
            return Err(ShredError::Config(
                "keep-all-untagged cannot be combined with must-match-tagged".into(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(ShredError::Config("min-size is greater than max-size".into()));
        }
        if self.threads == 0 {
            return Err(ShredError::Config("threads must be at least 1".into()));
        }
        if self.threads_per_disk == 0 {
            return Err(ShredError::Config("threads-per-disk must be at least 1".into()));
        }
        if self.honour_dir_layout && !self.merge_directories {
            return Err(ShredError::Config(
                "honour-dir-layout requires merge-directories".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_incompatible_tagging_flags() {
        let mut cfg = Config::default();
        cfg.keep_all_tagged = true;
        cfg.must_match_untagged = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn fraction_offset_resolves_relative_to_size() {
        assert_eq!(SizeOffset::Fraction(0.5).resolve(1000), 500);
        assert_eq!(SizeOffset::Bytes(2000).resolve(1000), 1000);
    }
}
