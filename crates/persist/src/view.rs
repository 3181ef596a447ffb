//! Views: handles that resolve to one root and delegate locking to it.
//!
//! A view holds the root plus a [`Lens`] from the root state to its target, never
//! another view. Deriving a sub-view copies the same flattened backing, so every
//! handle, however derived, locks exactly one root lock.

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLockReadGuard, RwLockWriteGuard,
};

use crate::container::PersistentContainer;
use crate::data::PersistentData;

/// Borrow projection from a root state `T` to the part `S` a view targets.
pub trait Lens<T, S>: Send + Sync + 'static {
    fn get<'a>(&self, root: &'a T) -> &'a S;
    fn get_mut<'a>(&self, root: &'a mut T) -> &'a mut S;
}

/// The lens of a view over the whole root state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<T> Lens<T, T> for Identity {
    fn get<'a>(&self, root: &'a T) -> &'a T {
        root
    }

    fn get_mut<'a>(&self, root: &'a mut T) -> &'a mut T {
        root
    }
}

/// Type-erased root + lens pair every view holds.
pub trait Backing<S>: Send + Sync {
    fn read(&self) -> MappedRwLockReadGuard<'_, S>;
    fn write(&self) -> MappedRwLockWriteGuard<'_, S>;
    fn data(&self) -> &dyn PersistentData;
}

struct Projection<T, S, L> {
    root: PersistentContainer<T>,
    lens: L,
    _target: PhantomData<fn(&S)>,
}

impl<T, S, L> Backing<S> for Projection<T, S, L>
where
    T: Send + Sync + 'static,
    L: Lens<T, S>,
{
    fn read(&self) -> MappedRwLockReadGuard<'_, S> {
        RwLockReadGuard::map(self.root.lock().read(), |state| self.lens.get(state))
    }

    fn write(&self) -> MappedRwLockWriteGuard<'_, S> {
        RwLockWriteGuard::map(self.root.lock().write(), |state| self.lens.get_mut(state))
    }

    fn data(&self) -> &dyn PersistentData {
        &self.root
    }
}

/// Shared plumbing of every view: the locking primitives over a backing.
pub(crate) struct ViewCore<S> {
    backing: Arc<dyn Backing<S>>,
}

impl<S> Clone for ViewCore<S> {
    fn clone(&self) -> Self {
        Self {
            backing: Arc::clone(&self.backing),
        }
    }
}

impl<S: 'static> ViewCore<S> {
    pub(crate) fn project<T, L>(root: PersistentContainer<T>, lens: L) -> Self
    where
        T: Send + Sync + 'static,
        L: Lens<T, S>,
    {
        Self {
            backing: Arc::new(Projection {
                root,
                lens,
                _target: PhantomData,
            }),
        }
    }
}

impl<S> ViewCore<S> {
    pub(crate) fn data(&self) -> &dyn PersistentData {
        self.backing.data()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let guard = self.backing.read();
        f(&*guard)
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut guard = self.backing.write();
        let out = f(&mut *guard);
        self.backing.data().mark_dirty();
        out
    }

    pub(crate) fn test_write<R>(
        &self,
        f: impl FnOnce(&mut S) -> R,
        changed: impl FnOnce(&R) -> bool,
    ) -> R {
        let mut guard = self.backing.write();
        let out = f(&mut *guard);
        if changed(&out) {
            self.backing.data().mark_dirty();
        }
        out
    }

    /// Snapshot-then-compare so one thread never read-locks the same root twice.
    pub(crate) fn eq_with(&self, other: &Self) -> bool
    where
        S: Clone + PartialEq,
    {
        let mine = self.read(S::clone);
        other.read(|theirs| mine == *theirs)
    }
}

/// Route `PersistentData` (and optionally `LockedAccess`) through a view's `core`.
macro_rules! delegate_view {
    ($view:ident<$($param:ident),+>) => {
        impl<$($param),+> $crate::data::PersistentData for $view<$($param),+>
        where
            $($param: Send + Sync + 'static),+
        {
            fn path(&self) -> &std::path::Path {
                self.core.data().path()
            }

            fn mark_dirty(&self) {
                self.core.data().mark_dirty()
            }

            fn is_dirty(&self) -> bool {
                self.core.data().is_dirty()
            }

            fn reload(&self) -> Result<(), $crate::error::PersistError> {
                self.core.data().reload()
            }

            fn flush(&self) -> Result<bool, $crate::error::PersistError> {
                self.core.data().flush()
            }

            fn wait_for_flush(&self, timeout: std::time::Duration) -> bool {
                self.core.data().wait_for_flush(timeout)
            }

            fn stats(&self) -> $crate::container::FlushStats {
                self.core.data().stats()
            }
        }
    };
    ($view:ident<$($param:ident),+> => $target:ty) => {
        $crate::view::delegate_view!($view<$($param),+>);

        impl<$($param),+> $crate::data::LockedAccess for $view<$($param),+>
        where
            $($param: Send + Sync + 'static),+
        {
            type Target = $target;

            fn read_locked<R>(&self, f: impl FnOnce(&$target) -> R) -> R {
                self.core.read(f)
            }

            fn write_locked<R>(&self, f: impl FnOnce(&mut $target) -> R) -> R {
                self.core.write(f)
            }

            fn test_write_locked<R>(
                &self,
                f: impl FnOnce(&mut $target) -> R,
                changed: impl FnOnce(&R) -> bool,
            ) -> R {
                self.core.test_write(f, changed)
            }
        }
    };
}

pub(crate) use delegate_view;
