//! Single-value views.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::container::PersistentContainer;
use crate::view::{Identity, Lens, ViewCore, delegate_view};

/// One value held by a root, either the whole state or a field of it.
pub struct PersistentValue<V> {
    core: ViewCore<V>,
}

delegate_view!(PersistentValue<V> => V);

impl<V> Clone for PersistentValue<V> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<V: Send + Sync + 'static> PersistentValue<V> {
    pub fn new(root: PersistentContainer<V>) -> Self {
        Self::project(root, Identity)
    }

    pub fn project<T: Send + Sync + 'static>(
        root: PersistentContainer<T>,
        lens: impl Lens<T, V>,
    ) -> Self {
        Self {
            core: ViewCore::project(root, lens),
        }
    }
}

impl<V> PersistentValue<V> {
    pub fn get(&self) -> V
    where
        V: Clone,
    {
        self.core.read(V::clone)
    }

    pub fn set(&self, value: V) {
        self.core.write(|v| *v = value);
    }

    /// Store `value`, returning the previous one.
    pub fn replace(&self, value: V) -> V {
        self.core.write(|v| std::mem::replace(v, value))
    }

    /// Edit the value in place under the write lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut V) -> R) -> R {
        self.core.write(f)
    }

    /// Read the value under the read lock without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        self.core.read(f)
    }
}

impl<V: Clone + PartialEq> PartialEq for PersistentValue<V> {
    fn eq(&self, other: &Self) -> bool {
        self.core.eq_with(&other.core)
    }
}

impl<V: Clone + Eq> Eq for PersistentValue<V> {}

impl<V: Hash> Hash for PersistentValue<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.read(|v| v.hash(state));
    }
}

impl<V: fmt::Debug> fmt::Debug for PersistentValue<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.read(|v| fmt::Debug::fmt(v, f))
    }
}
