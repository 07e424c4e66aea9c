/* Shutdown sequencing: a Ctrl-C-driven running flag plus a single teardown
 * routine guarded so it runs exactly once regardless of which thread (signal
 * handler vs. main loop) notices first. */
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

#[derive(Clone)]
pub struct ShutdownGuard {
    running: Arc<AtomicBool>,
    torn_down: Arc<AtomicBool>,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            torn_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Install the Ctrl-C handler. The handler only flips the flag; the
    /// actual teardown runs on whichever thread calls `teardown_once` first.
    pub fn install_handler(&self) -> Result<()> {
        let running = self.running.clone();
        ctrlc::set_handler(move || {
            info!("received interrupt, shutting down");
            running.store(false, Ordering::Relaxed);
        })
        .context("failed to install Ctrl-C handler")
    }

    /// Run `teardown` at most once across however many call sites invoke it.
    pub fn teardown_once(&self, teardown: impl FnOnce()) {
        if self
            .torn_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            teardown();
        }
    }
}

impl Default for ShutdownGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn flag_starts_running_and_install_does_not_flip_it() {
        let guard = ShutdownGuard::new();
        assert!(guard.is_running());
    }

    #[test]
    fn teardown_once_runs_exactly_once() {
        let guard = ShutdownGuard::new();
        let count = Arc::new(AtomicU32::new(0));
        for _ in 0..5 {
            let count = count.clone();
            guard.teardown_once(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn running_flag_shares_state_with_guard() {
        let guard = ShutdownGuard::new();
        let flag = guard.running_flag();
        flag.store(false, Ordering::Relaxed);
        assert!(!guard.is_running());
    }
}
