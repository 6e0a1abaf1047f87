use std::path::PathBuf;

/// Errors that actually stop a run. Per-file conditions never reach this
/// type -- they downgrade the offending `FileRecord` to `LintKind::Unknown`
/// (or another lint kind) and are only logged, per the error taxonomy in
/// the core's design document.
#[derive(Debug, thiserror::Error)]
pub enum ShredError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal invariant violated: {0}")]
    Fatal(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ShredError>;

impl ShredError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ShredError::Io { path: path.into(), source }
    }
}
