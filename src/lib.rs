pub mod buffer_pool;
pub mod cancellation;
pub mod config;
pub mod criteria;
pub mod device;
pub mod digest;
pub mod error;
pub mod file_record;
pub mod joiner;
pub mod metadata;
pub mod mount_table;
pub mod offset_oracle;
pub mod output;
pub mod path_trie;
pub mod preprocessor;
pub mod replay;
pub mod shredder;
pub mod tree_merger;
pub mod xattr_cache;

pub use crate::config::{Config, DigestKind, MatchCriteria, SizeOffset};
pub use crate::criteria::Criteria;
pub use crate::error::{Result, ShredError};
pub use crate::file_record::{FileRecord, LintKind};
pub use crate::output::OutputSink;
pub use crate::preprocessor::{PreprocessOutcome, Preprocessor, SizeGroup, TraversalEntry};
pub use crate::replay::{replay, ReplayRecord, ReplaySource};
pub use crate::shredder::{ShredOutcome, Shredder};
pub use crate::tree_merger::{pre_pass_counts, DuplicateDirGroup, TreeMerger};
