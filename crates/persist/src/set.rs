//! Ordered set views.

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Bound::{Excluded, Unbounded};

use crate::container::PersistentContainer;
use crate::view::{Identity, Lens, ViewCore, delegate_view};

/// A `BTreeSet` held by a root.
pub struct PersistentSet<E> {
    core: ViewCore<BTreeSet<E>>,
}

delegate_view!(PersistentSet<E> => BTreeSet<E>);

impl<E> Clone for PersistentSet<E> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<E: Ord + Send + Sync + 'static> PersistentSet<E> {
    pub fn new(root: PersistentContainer<BTreeSet<E>>) -> Self {
        Self::project(root, Identity)
    }

    pub fn project<T: Send + Sync + 'static>(
        root: PersistentContainer<T>,
        lens: impl Lens<T, BTreeSet<E>>,
    ) -> Self {
        Self {
            core: ViewCore::project(root, lens),
        }
    }
}

impl<E: Ord> PersistentSet<E> {
    pub fn len(&self) -> usize {
        self.core.read(BTreeSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.core.read(BTreeSet::is_empty)
    }

    pub fn contains<Q>(&self, item: &Q) -> bool
    where
        E: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.core.read(|s| s.contains(item))
    }

    /// Returns whether the item was new.
    pub fn insert(&self, item: E) -> bool {
        self.core.test_write(|s| s.insert(item), |added| *added)
    }

    pub fn remove<Q>(&self, item: &Q) -> bool
    where
        E: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.core.test_write(|s| s.remove(item), |removed| *removed)
    }

    /// Returns whether the set grew.
    pub fn extend(&self, items: impl IntoIterator<Item = E>) -> bool {
        let items: Vec<E> = items.into_iter().collect();
        if items.is_empty() {
            return false;
        }
        self.core.test_write(
            |s| {
                let before = s.len();
                s.extend(items);
                s.len() != before
            },
            |grew| *grew,
        )
    }

    pub fn retain(&self, mut keep: impl FnMut(&E) -> bool) -> bool {
        self.core.test_write(
            |s| {
                let before = s.len();
                s.retain(|e| keep(e));
                s.len() != before
            },
            |removed| *removed,
        )
    }

    pub fn clear(&self) {
        self.core.test_write(
            |s| {
                let had = !s.is_empty();
                s.clear();
                had
            },
            |had| *had,
        );
    }

    pub fn first(&self) -> Option<E>
    where
        E: Clone,
    {
        self.core.read(|s| s.first().cloned())
    }

    pub fn last(&self) -> Option<E>
    where
        E: Clone,
    {
        self.core.read(|s| s.last().cloned())
    }

    pub fn to_set(&self) -> BTreeSet<E>
    where
        E: Clone,
    {
        self.core.read(BTreeSet::clone)
    }

    /// Live cursor in ascending order. It resumes after the last element it
    /// returned, so concurrent inserts and removals never invalidate it.
    pub fn iter(&self) -> SetCursor<E> {
        SetCursor {
            core: self.core.clone(),
            last: None,
            removable: false,
        }
    }
}

impl<E: Ord + Clone> PartialEq for PersistentSet<E> {
    fn eq(&self, other: &Self) -> bool {
        self.core.eq_with(&other.core)
    }
}

impl<E: Ord + Clone> Eq for PersistentSet<E> {}

impl<E: Hash> Hash for PersistentSet<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.read(|s| s.hash(state));
    }
}

impl<E: fmt::Debug> fmt::Debug for PersistentSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.read(|s| f.debug_set().entries(s).finish())
    }
}

pub struct SetCursor<E> {
    core: ViewCore<BTreeSet<E>>,
    last: Option<E>,
    removable: bool,
}

impl<E: Ord> SetCursor<E> {
    /// Remove the element the last `next` returned.
    pub fn remove(&mut self) -> bool {
        if !self.removable {
            return false;
        }
        self.removable = false;
        let Some(last) = &self.last else {
            return false;
        };
        self.core.test_write(|s| s.remove(last), |removed| *removed)
    }
}

impl<E: Ord + Clone> Iterator for SetCursor<E> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        let item = self.core.read(|s| match &self.last {
            Some(last) => s.range::<E, _>((Excluded(last), Unbounded)).next().cloned(),
            None => s.first().cloned(),
        })?;
        self.last = Some(item.clone());
        self.removable = true;
        Some(item)
    }
}

impl<E: fmt::Debug> fmt::Debug for SetCursor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetCursor")
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}
