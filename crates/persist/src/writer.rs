//! Background write-back: the dirty monitor and the per-root writer thread.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::container::FlushStats;
use crate::error::PersistError;

/// A root that the writer thread and the shutdown registry can flush without
/// knowing its state type.
pub(crate) trait Flush: Send + Sync {
    fn flush(&self) -> Result<bool, PersistError>;
    fn path(&self) -> &Path;
}

#[derive(Debug, Default)]
struct SignalState {
    dirty: bool,
    /// Bumped by every `mark`; the writer wakes when it moves.
    epoch: u64,
    in_flight: bool,
    closed: bool,
    writes: u64,
    failures: u64,
}

/// Dirty flag plus the monitor the writer parks on.
///
/// Kept apart from the data lock so a mutation holding the write lock can mark
/// dirty without re-entering it.
#[derive(Debug, Default)]
pub(crate) struct DirtySignal {
    state: Mutex<SignalState>,
    changed: Condvar,
}

impl DirtySignal {
    pub(crate) fn mark(&self) {
        let mut state = self.state.lock();
        state.dirty = true;
        state.epoch = state.epoch.wrapping_add(1);
        self.changed.notify_all();
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Drop the flag without writing (reload).
    pub(crate) fn clear(&self) {
        let mut state = self.state.lock();
        state.dirty = false;
        self.changed.notify_all();
    }

    /// Called under the data read lock once the snapshot is serialized.
    pub(crate) fn begin_write(&self) {
        let mut state = self.state.lock();
        state.dirty = false;
        state.in_flight = true;
    }

    /// A failed write re-arms the flag but leaves the epoch alone, so the writer
    /// retries on the next mutation rather than spinning on a broken disk.
    pub(crate) fn finish_write(&self, ok: bool) {
        let mut state = self.state.lock();
        state.in_flight = false;
        if ok {
            state.writes += 1;
        } else {
            state.failures += 1;
            state.dirty = true;
        }
        self.changed.notify_all();
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.changed.notify_all();
    }

    pub(crate) fn stats(&self) -> FlushStats {
        let state = self.state.lock();
        FlushStats {
            writes: state.writes,
            failures: state.failures,
        }
    }

    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.dirty || state.in_flight {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return !state.dirty && !state.in_flight;
            }
        }
        true
    }

    /// Park until the epoch moves past `seen`. `None` once the root is closed.
    fn wait_for_epoch(&self, seen: u64) -> Option<u64> {
        let mut state = self.state.lock();
        while state.epoch == seen && !state.closed {
            self.changed.wait(&mut state);
        }
        if state.closed { None } else { Some(state.epoch) }
    }
}

/// Start the writer thread for one root. It holds only a weak reference, so the
/// root is dropped (and its final flush runs) once the last handle goes away.
pub(crate) fn spawn(
    name: String,
    root: Weak<dyn Flush>,
    signal: Arc<DirtySignal>,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name(name)
        .spawn(move || run(root, signal))?;
    Ok(())
}

fn run(root: Weak<dyn Flush>, signal: Arc<DirtySignal>) {
    let mut seen = 0;
    while let Some(epoch) = signal.wait_for_epoch(seen) {
        seen = epoch;
        let Some(root) = root.upgrade() else {
            break;
        };
        tracing::trace!(epoch, path = %root.path().display(), "writer woke");
        if let Err(err) = root.flush() {
            tracing::warn!(
                path = %root.path().display(),
                error = %err,
                "background flush failed"
            );
        }
    }
    tracing::trace!("writer exiting");
}

/// Replace the whole document, creating the parent directory on demand.
pub(crate) fn write_document(path: &Path, text: &str) -> Result<(), PersistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}
