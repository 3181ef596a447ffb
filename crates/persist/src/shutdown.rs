//! Process-wide registry of live roots for the exit-time flush.
//!
//! Rust runs no hooks at process exit, so the binary keeps a [`ShutdownGuard`]
//! alive in `main`; dropping it flushes every root that is still dirty.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, const_mutex};

use crate::writer::Flush;

static LIVE_ROOTS: Mutex<Vec<Weak<dyn Flush>>> = const_mutex(Vec::new());

pub(crate) fn register(root: Weak<dyn Flush>) {
    let mut roots = LIVE_ROOTS.lock();
    roots.retain(|r| r.strong_count() > 0);
    roots.push(root);
}

/// Synchronously flush every live root that is dirty. Returns the number of
/// documents written. Failures are logged and skipped.
pub fn flush_all() -> usize {
    let roots: Vec<Arc<dyn Flush>> = LIVE_ROOTS.lock().iter().filter_map(Weak::upgrade).collect();
    let mut written = 0;
    for root in roots {
        match root.flush() {
            Ok(true) => written += 1,
            Ok(false) => {}
            Err(err) => tracing::warn!(
                path = %root.path().display(),
                error = %err,
                "shutdown flush failed"
            ),
        }
    }
    written
}

/// Flushes all live roots when dropped.
#[must_use = "the final flush runs when the guard is dropped"]
#[derive(Debug)]
pub struct ShutdownGuard {
    _private: (),
}

/// Create the guard `main` holds until exit.
pub fn shutdown_guard() -> ShutdownGuard {
    ShutdownGuard { _private: () }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let written = flush_all();
        tracing::debug!(written, "shutdown flush complete");
    }
}
