//! Single-flight submission latch
//!
//! At most one submission attempt may be in flight per collection. The
//! latch is a boolean, not a counting semaphore: entering while held
//! fails immediately instead of waiting, which makes the drive entry
//! point safe to invoke redundantly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Boolean latch gating the submission path.
#[derive(Debug, Default)]
pub struct SubmitGuard {
    held: Arc<AtomicBool>,
}

impl SubmitGuard {
    pub fn new() -> Self {
        Self {
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attempt to take the latch.
    ///
    /// Returns `None` when a submission pass already holds it. The
    /// returned permit releases the latch when dropped, so every exit
    /// path out of the submission code releases it.
    pub fn try_enter(&self) -> Option<SubmitPermit> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then(|| SubmitPermit {
                held: Arc::clone(&self.held),
                entered_at: Instant::now(),
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// RAII permit for one pass through the submission path.
#[derive(Debug)]
pub struct SubmitPermit {
    held: Arc<AtomicBool>,
    entered_at: Instant,
}

impl Drop for SubmitPermit {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
        tracing::trace!(
            held_ms = self.entered_at.elapsed().as_millis() as u64,
            "submission latch released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_is_exclusive_while_held() {
        let guard = SubmitGuard::new();

        let permit = guard.try_enter();
        assert!(permit.is_some());
        assert!(guard.is_held());

        // Second entry fails instead of waiting
        assert!(guard.try_enter().is_none());
    }

    #[test]
    fn test_drop_releases_latch() {
        let guard = SubmitGuard::new();

        {
            let _permit = guard.try_enter().unwrap();
            assert!(guard.is_held());
        }

        assert!(!guard.is_held());
        assert!(guard.try_enter().is_some());
    }

    #[test]
    fn test_latch_released_when_holder_panics() {
        let guard = SubmitGuard::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _permit = guard.try_enter().unwrap();
            panic!("submission blew up");
        }));

        assert!(result.is_err());
        assert!(!guard.is_held());
    }
}
