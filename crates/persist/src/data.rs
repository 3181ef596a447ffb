use std::path::Path;
use std::time::Duration;

use crate::container::FlushStats;
use crate::error::PersistError;

/// Capabilities shared by every persisted handle: the root container, each view
/// derived from it, and composite objects built on top.
///
/// Views route every call to the root they resolved at construction.
pub trait PersistentData: Send + Sync {
    /// Backing file of the resolved root.
    fn path(&self) -> &Path;

    /// Flag the in-memory state as ahead of disk and wake the writer.
    fn mark_dirty(&self);

    fn is_dirty(&self) -> bool;

    /// Re-read the backing file (or re-apply defaults if it is absent) and clear
    /// the dirty flag. Unflushed in-memory changes are discarded.
    fn reload(&self) -> Result<(), PersistError>;

    /// Synchronously write the current snapshot if dirty. Returns whether a write happened.
    fn flush(&self) -> Result<bool, PersistError>;

    /// Block until no write is pending or in flight. Returns `false` on timeout.
    fn wait_for_flush(&self, timeout: Duration) -> bool;

    fn stats(&self) -> FlushStats;
}

/// Locked access to the state a handle wraps.
///
/// Each call is one self-contained critical section on the root lock. The write
/// variants mark the root dirty; [`LockedAccess::test_write_locked`] only does so
/// when `changed` reports that the operation altered the state.
pub trait LockedAccess {
    type Target;

    fn read_locked<R>(&self, f: impl FnOnce(&Self::Target) -> R) -> R;

    fn write_locked<R>(&self, f: impl FnOnce(&mut Self::Target) -> R) -> R;

    fn test_write_locked<R>(
        &self,
        f: impl FnOnce(&mut Self::Target) -> R,
        changed: impl FnOnce(&R) -> bool,
    ) -> R;

    fn do_read_locked(&self, f: impl FnOnce(&Self::Target)) {
        self.read_locked(f)
    }

    fn do_write_locked(&self, f: impl FnOnce(&mut Self::Target)) {
        self.write_locked(f)
    }
}
