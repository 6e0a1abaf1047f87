use std::sync::atomic::{AtomicU32, Ordering};

/// A process-wide cancellation flag, polled at each suspension point
/// (file read, buffer acquire, joiner push, shred-group lock).
///
/// This generalizes the teacher's `Settings::break_on: Option<&'static
/// AtomicU32>` (set from a `ctrlc` handler in the original binary) into a
/// standalone counter owned by the engine itself: one `request()` lets the
/// current pass finish and flushes the output sink; a second aborts
/// immediately. The embedding application is responsible for wiring an
/// actual signal handler to `request()` -- this crate never installs one.
#[derive(Debug, Default)]
pub struct CancellationToken(AtomicU32);

impl CancellationToken {
    pub const fn new() -> Self {
        CancellationToken(AtomicU32::new(0))
    }

    /// Called by the embedding application's signal handler (or anything
    /// else that wants to stop the run).
    pub fn request(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    /// 0 = run normally. 1 = finish in-flight work, flush, then stop. >=2 =
    /// abort immediately.
    pub fn observed(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.observed() > 0
    }

    pub fn is_hard(&self) -> bool {
        self.observed() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_on_repeated_request() {
        let tok = CancellationToken::new();
        assert_eq!(tok.observed(), 0);
        assert!(!tok.is_requested());
        tok.request();
        assert!(tok.is_requested());
        assert!(!tok.is_hard());
        tok.request();
        assert!(tok.is_hard());
    }
}
