//! Persistence: lock-guarded JSON containers, derived views, background write-back.
//!
//! A [`PersistentContainer`] owns one backing file, one read/write lock and the
//! canonical in-memory state. Views ([`PersistentList`], [`PersistentSet`],
//! [`PersistentMap`], [`PersistentValue`] and their sub-views) resolve to exactly
//! one root and delegate every locked operation to it.
//!
//! # Invariants
//! - At most one write-back is in flight per root.
//! - Serialization happens entirely under the read lock; disk IO never holds the data lock.
//! - Every mutation that changes state marks the root dirty.
//! - No public operation holds the lock across two calls.

mod container;
mod data;
mod error;
pub mod json;
mod list;
mod map;
mod set;
mod shutdown;
mod value;
mod view;
mod writer;

pub use container::{ContainerConfig, FlushStats, PersistentContainer, StateCodec};
pub use data::{LockedAccess, PersistentData};
pub use error::PersistError;
pub use json::JsonCodec;
pub use list::{ListCursor, PersistentList, PersistentSubList};
pub use map::{
    EntryCursor, KeyCursor, MapCursor, PersistentEntries, PersistentKeys, PersistentMap,
    PersistentValues, ValueCursor,
};
pub use set::{PersistentSet, SetCursor};
pub use shutdown::{ShutdownGuard, flush_all, shutdown_guard};
pub use value::PersistentValue;
pub use view::{Backing, Identity, Lens};

pub fn crate_info() -> &'static str {
    "keepsake-persist v0.1.0"
}
