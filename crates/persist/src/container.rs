//! The root container: backing file, shared lock, canonical state, writer.
//!
//! ```text
//! Uninitialized --open--> Loaded(clean) --mutation--> Loaded(dirty)
//!       |                      ^                           |
//!       +--load error          +------ write ok ---- Writing (writer wakes)
//!                              Loaded(dirty) <-- write failed
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::data::{LockedAccess, PersistentData};
use crate::error::PersistError;
use crate::shutdown;
use crate::writer::{self, DirtySignal, Flush};

/// Strategy a root uses to move its state to and from text.
pub trait StateCodec<T>: Send + Sync {
    /// Render the whole state. Runs under the read lock.
    fn serialize(&self, state: &T) -> Result<String, PersistError>;

    /// Install the document's contents into the existing state.
    fn deserialize(&self, text: &str, state: &mut T) -> Result<(), PersistError>;

    /// Reset the existing state to its default (file absent).
    fn apply_default(&self, state: &mut T);
}

/// Per-root settings.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Spawn the dedicated writer thread. Without it the state only reaches disk
    /// through explicit flushes, the drop flush and [`crate::flush_all`].
    pub background_writer: bool,
    /// Flush once more when the last handle to the root is dropped.
    pub flush_on_drop: bool,
    /// Thread name for the writer.
    pub writer_name: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            background_writer: true,
            flush_on_drop: true,
            writer_name: "keepsake-writer".into(),
        }
    }
}

/// Completed write-back counters for one root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub writes: u64,
    pub failures: u64,
}

/// Root of a persisted state tree.
///
/// Cloning yields another handle to the same root. The root lives while any
/// handle or view references it.
pub struct PersistentContainer<T> {
    inner: Arc<ContainerInner<T>>,
}

struct ContainerInner<T> {
    path: PathBuf,
    state: RwLock<T>,
    codec: Box<dyn StateCodec<T>>,
    signal: Arc<DirtySignal>,
    /// Orders snapshot-then-write so two flushes never land out of order.
    io: Mutex<()>,
    flush_on_drop: bool,
}

impl<T> Clone for PersistentContainer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> PersistentContainer<T> {
    /// Open the root at `path` with the default configuration.
    ///
    /// The file is loaded if it exists; otherwise `codec.apply_default` shapes the
    /// initial state and nothing is written until the first mutation.
    pub fn open(
        path: impl Into<PathBuf>,
        default: impl FnOnce() -> T,
        codec: impl StateCodec<T> + 'static,
    ) -> Result<Self, PersistError> {
        Self::open_with(path, default, codec, ContainerConfig::default())
    }

    pub fn open_with(
        path: impl Into<PathBuf>,
        default: impl FnOnce() -> T,
        codec: impl StateCodec<T> + 'static,
        config: ContainerConfig,
    ) -> Result<Self, PersistError> {
        let path = path.into();
        let codec: Box<dyn StateCodec<T>> = Box::new(codec);
        let mut state = default();
        let loaded =
            load_into(&path, codec.as_ref(), &mut state).map_err(|source| PersistError::Load {
                path: path.clone(),
                source: Box::new(source),
            })?;

        let inner = Arc::new(ContainerInner {
            path,
            state: RwLock::new(state),
            codec,
            signal: Arc::new(DirtySignal::default()),
            io: Mutex::new(()),
            flush_on_drop: config.flush_on_drop,
        });
        let weak: Weak<dyn Flush> = Arc::downgrade(&inner) as Weak<dyn Flush>;
        if config.background_writer {
            writer::spawn(config.writer_name, weak.clone(), Arc::clone(&inner.signal))
                .map_err(PersistError::Writer)?;
        }
        shutdown::register(weak);

        tracing::debug!(path = %inner.path.display(), loaded, "opened persistent container");
        Ok(Self { inner })
    }
}

impl<T> PersistentContainer<T> {
    /// The shared lock guarding the state. Mutations made through a raw write
    /// guard must be followed by [`PersistentData::mark_dirty`].
    pub fn lock(&self) -> &RwLock<T> {
        &self.inner.state
    }
}

impl<T: Send + Sync + 'static> PersistentData for PersistentContainer<T> {
    fn path(&self) -> &Path {
        &self.inner.path
    }

    fn mark_dirty(&self) {
        self.inner.signal.mark();
    }

    fn is_dirty(&self) -> bool {
        self.inner.signal.is_dirty()
    }

    fn reload(&self) -> Result<(), PersistError> {
        // Same order as `write_back`: io first, then state.
        let _io = self.inner.io.lock();
        let mut state = self.inner.state.write();
        if self.inner.signal.is_dirty() {
            tracing::warn!(
                path = %self.inner.path.display(),
                "reload discards unflushed changes"
            );
        }
        load_into(&self.inner.path, self.inner.codec.as_ref(), &mut *state)?;
        self.inner.signal.clear();
        Ok(())
    }

    fn flush(&self) -> Result<bool, PersistError> {
        self.inner.write_back()
    }

    fn wait_for_flush(&self, timeout: Duration) -> bool {
        self.inner.signal.wait_idle(timeout)
    }

    fn stats(&self) -> FlushStats {
        self.inner.signal.stats()
    }
}

impl<T: Send + Sync + 'static> LockedAccess for PersistentContainer<T> {
    type Target = T;

    fn read_locked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let state = self.inner.state.read();
        f(&*state)
    }

    fn write_locked<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut state = self.inner.state.write();
        let out = f(&mut *state);
        self.inner.signal.mark();
        out
    }

    fn test_write_locked<R>(
        &self,
        f: impl FnOnce(&mut T) -> R,
        changed: impl FnOnce(&R) -> bool,
    ) -> R {
        let mut state = self.inner.state.write();
        let out = f(&mut *state);
        if changed(&out) {
            self.inner.signal.mark();
        }
        out
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistentContainer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("PersistentContainer")
            .field("path", &self.inner.path)
            .field("state", &*state)
            .finish()
    }
}

impl<T> ContainerInner<T> {
    /// Serialize under the read lock, clear dirty, then write without the lock.
    fn write_back(&self) -> Result<bool, PersistError> {
        let _io = self.io.lock();
        let text = {
            let state = self.state.read();
            if !self.signal.is_dirty() {
                return Ok(false);
            }
            let text = self.codec.serialize(&state)?;
            self.signal.begin_write();
            text
        };

        let _span = tracing::debug_span!("flush", path = %self.path.display()).entered();
        let result = writer::write_document(&self.path, &text);
        self.signal.finish_write(result.is_ok());
        result?;
        tracing::debug!(bytes = text.len(), "flushed");
        Ok(true)
    }
}

impl<T: Send + Sync> Flush for ContainerInner<T> {
    fn flush(&self) -> Result<bool, PersistError> {
        self.write_back()
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> Drop for ContainerInner<T> {
    fn drop(&mut self) {
        if self.flush_on_drop && self.signal.is_dirty() {
            if let Err(err) = self.write_back() {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "final flush failed"
                );
            }
        }
        self.signal.close();
    }
}

/// Deserialize the file into `state`, or apply defaults when it does not exist.
/// Returns whether a file was read.
fn load_into<T>(
    path: &Path,
    codec: &dyn StateCodec<T>,
    state: &mut T,
) -> Result<bool, PersistError> {
    match fs::read_to_string(path) {
        Ok(text) => {
            codec.deserialize(&text, state)?;
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            codec.apply_default(state);
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}
