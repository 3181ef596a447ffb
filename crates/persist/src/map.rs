//! Ordered map views and the key, value and entry views derived from them.
//!
//! The derived views share the map's backing. A removal through `keys()` is a
//! removal from the map, visible to every other handle on the same root.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Bound::{Excluded, Unbounded};

use crate::container::PersistentContainer;
use crate::view::{Identity, Lens, ViewCore, delegate_view};

/// A `BTreeMap` held by a root.
pub struct PersistentMap<K, V> {
    core: ViewCore<BTreeMap<K, V>>,
}

delegate_view!(PersistentMap<K, V> => BTreeMap<K, V>);

impl<K, V> Clone for PersistentMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<K, V> PersistentMap<K, V>
where
    K: Ord + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(root: PersistentContainer<BTreeMap<K, V>>) -> Self {
        Self::project(root, Identity)
    }

    pub fn project<T: Send + Sync + 'static>(
        root: PersistentContainer<T>,
        lens: impl Lens<T, BTreeMap<K, V>>,
    ) -> Self {
        Self {
            core: ViewCore::project(root, lens),
        }
    }
}

impl<K: Ord, V> PersistentMap<K, V> {
    pub fn len(&self) -> usize {
        self.core.read(BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.core.read(BTreeMap::is_empty)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        V: Clone,
    {
        self.core.read(|m| m.get(key).cloned())
    }

    /// The value for `key`, or `default` when absent.
    pub fn get_or<Q>(&self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        V: Clone,
    {
        self.get(key).unwrap_or(default)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.core.read(|m| m.contains_key(key))
    }

    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.core.read(|m| m.values().any(|v| v == value))
    }

    /// Returns the previous value.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.core.write(|m| m.insert(key, value))
    }

    /// Insert only when `key` is absent. Returns the existing value otherwise.
    pub fn put_if_absent(&self, key: K, value: V) -> Option<V>
    where
        V: Clone,
    {
        self.core.test_write(
            |m| match m.get(&key) {
                Some(existing) => Some(existing.clone()),
                None => {
                    m.insert(key, value);
                    None
                }
            },
            Option::is_none,
        )
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.core.test_write(|m| m.remove(key), Option::is_some)
    }

    /// Remove `key` only while it maps to `value`.
    pub fn remove_matching<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        V: PartialEq,
    {
        self.core.test_write(
            |m| {
                if m.get(key) == Some(value) {
                    m.remove(key);
                    true
                } else {
                    false
                }
            },
            |removed| *removed,
        )
    }

    /// Replace the mapping for `key` with `f(key, current)`. `None` removes it.
    /// Returns the new value.
    pub fn compute(&self, key: K, f: impl FnOnce(&K, Option<V>) -> Option<V>) -> Option<V>
    where
        V: Clone,
    {
        self.core
            .test_write(
                |m| {
                    let old = m.remove(&key);
                    let existed = old.is_some();
                    match f(&key, old) {
                        Some(value) => {
                            m.insert(key, value.clone());
                            (Some(value), true)
                        }
                        None => (None, existed),
                    }
                },
                |(_, changed)| *changed,
            )
            .0
    }

    /// Compute and insert a value only when `key` is absent. Returns the
    /// current value afterwards.
    pub fn compute_if_absent(&self, key: K, f: impl FnOnce(&K) -> Option<V>) -> Option<V>
    where
        V: Clone,
    {
        self.core
            .test_write(
                |m| {
                    if let Some(existing) = m.get(&key) {
                        return (Some(existing.clone()), false);
                    }
                    match f(&key) {
                        Some(value) => {
                            m.insert(key, value.clone());
                            (Some(value), true)
                        }
                        None => (None, false),
                    }
                },
                |(_, changed)| *changed,
            )
            .0
    }

    /// Recompute the value of a present `key`; `None` removes it.
    pub fn compute_if_present<Q>(&self, key: &Q, f: impl FnOnce(&K, V) -> Option<V>) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        V: Clone,
    {
        self.core
            .test_write(
                |m| {
                    let (key, old) = m.remove_entry(key)?;
                    let new = f(&key, old);
                    if let Some(value) = &new {
                        m.insert(key, value.clone());
                    }
                    Some(new)
                },
                Option::is_some,
            )
            .flatten()
    }

    /// Insert `value`, or combine it with the present one via `f`. A `None`
    /// result removes the key. Returns the new value.
    pub fn merge(&self, key: K, value: V, f: impl FnOnce(V, V) -> Option<V>) -> Option<V>
    where
        V: Clone,
    {
        self.core.write(|m| {
            let new = match m.remove(&key) {
                Some(old) => f(old, value),
                None => Some(value),
            };
            if let Some(value) = &new {
                m.insert(key, value.clone());
            }
            new
        })
    }

    pub fn extend(&self, entries: impl IntoIterator<Item = (K, V)>) {
        let entries: Vec<(K, V)> = entries.into_iter().collect();
        if entries.is_empty() {
            return;
        }
        self.core.write(|m| m.extend(entries));
    }

    /// Keep only the entries `keep` accepts. Returns whether any were removed.
    pub fn retain(&self, mut keep: impl FnMut(&K, &mut V) -> bool) -> bool {
        self.core.test_write(
            |m| {
                let before = m.len();
                m.retain(|k, v| keep(k, v));
                m.len() != before
            },
            |removed| *removed,
        )
    }

    pub fn clear(&self) {
        self.core.test_write(
            |m| {
                let had = !m.is_empty();
                m.clear();
                had
            },
            |had| *had,
        );
    }

    pub fn to_map(&self) -> BTreeMap<K, V>
    where
        K: Clone,
        V: Clone,
    {
        self.core.read(BTreeMap::clone)
    }

    pub fn keys(&self) -> PersistentKeys<K, V> {
        PersistentKeys {
            core: self.core.clone(),
        }
    }

    pub fn values(&self) -> PersistentValues<K, V> {
        PersistentValues {
            core: self.core.clone(),
        }
    }

    pub fn entries(&self) -> PersistentEntries<K, V> {
        PersistentEntries {
            core: self.core.clone(),
        }
    }

    /// Live cursor over `(key, value)` pairs in key order.
    pub fn iter(&self) -> EntryCursor<K, V>
    where
        K: Clone,
        V: Clone,
    {
        MapCursor::new(self.core.clone(), entry_of)
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq> PartialEq for PersistentMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.core.eq_with(&other.core)
    }
}

impl<K: Ord + Clone, V: Clone + Eq> Eq for PersistentMap<K, V> {}

impl<K: Hash, V: Hash> Hash for PersistentMap<K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.read(|m| m.hash(state));
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for PersistentMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.read(|m| f.debug_map().entries(m).finish())
    }
}

fn key_of<K: Clone, V>(key: &K, _: &V) -> K {
    key.clone()
}

fn value_of<K, V: Clone>(_: &K, value: &V) -> V {
    value.clone()
}

fn entry_of<K: Clone, V: Clone>(key: &K, value: &V) -> (K, V) {
    (key.clone(), value.clone())
}

/// Key-set view of a persisted map.
pub struct PersistentKeys<K, V> {
    core: ViewCore<BTreeMap<K, V>>,
}

delegate_view!(PersistentKeys<K, V>);

impl<K: Ord, V> PersistentKeys<K, V> {
    pub fn len(&self) -> usize {
        self.core.read(BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.core.read(BTreeMap::is_empty)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.core.read(|m| m.contains_key(key))
    }

    /// Remove the key and its value from the map.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.core.test_write(|m| m.remove(key).is_some(), |removed| *removed)
    }

    pub fn retain(&self, mut keep: impl FnMut(&K) -> bool) -> bool {
        self.core.test_write(
            |m| {
                let before = m.len();
                m.retain(|k, _| keep(k));
                m.len() != before
            },
            |removed| *removed,
        )
    }

    pub fn clear(&self) {
        clear_map(&self.core);
    }

    pub fn to_vec(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.core.read(|m| m.keys().cloned().collect())
    }

    pub fn iter(&self) -> KeyCursor<K, V>
    where
        K: Clone,
    {
        MapCursor::new(self.core.clone(), key_of)
    }
}

/// Values view of a persisted map.
pub struct PersistentValues<K, V> {
    core: ViewCore<BTreeMap<K, V>>,
}

delegate_view!(PersistentValues<K, V>);

impl<K: Ord, V> PersistentValues<K, V> {
    pub fn len(&self) -> usize {
        self.core.read(BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.core.read(BTreeMap::is_empty)
    }

    pub fn contains(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.core.read(|m| m.values().any(|v| v == value))
    }

    /// Remove the first entry (in key order) holding `value`.
    pub fn remove(&self, value: &V) -> bool
    where
        K: Clone,
        V: PartialEq,
    {
        self.core.test_write(
            |m| {
                let found = m.iter().find(|(_, v)| *v == value).map(|(k, _)| k.clone());
                found.is_some_and(|key| m.remove(&key).is_some())
            },
            |removed| *removed,
        )
    }

    pub fn retain(&self, mut keep: impl FnMut(&V) -> bool) -> bool {
        self.core.test_write(
            |m| {
                let before = m.len();
                m.retain(|_, v| keep(v));
                m.len() != before
            },
            |removed| *removed,
        )
    }

    pub fn clear(&self) {
        clear_map(&self.core);
    }

    pub fn to_vec(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.core.read(|m| m.values().cloned().collect())
    }

    pub fn iter(&self) -> ValueCursor<K, V>
    where
        K: Clone,
        V: Clone,
    {
        MapCursor::new(self.core.clone(), value_of)
    }
}

/// Entry-set view of a persisted map.
pub struct PersistentEntries<K, V> {
    core: ViewCore<BTreeMap<K, V>>,
}

delegate_view!(PersistentEntries<K, V>);

impl<K: Ord, V> PersistentEntries<K, V> {
    pub fn len(&self) -> usize {
        self.core.read(BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.core.read(BTreeMap::is_empty)
    }

    pub fn contains(&self, key: &K, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.core.read(|m| m.get(key) == Some(value))
    }

    pub fn remove(&self, key: &K, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.core.test_write(
            |m| {
                if m.get(key) == Some(value) {
                    m.remove(key);
                    true
                } else {
                    false
                }
            },
            |removed| *removed,
        )
    }

    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) -> bool {
        self.core.test_write(
            |m| {
                let before = m.len();
                m.retain(|k, v| keep(k, v));
                m.len() != before
            },
            |removed| *removed,
        )
    }

    pub fn clear(&self) {
        clear_map(&self.core);
    }

    pub fn to_vec(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.core
            .read(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    pub fn iter(&self) -> EntryCursor<K, V>
    where
        K: Clone,
        V: Clone,
    {
        MapCursor::new(self.core.clone(), entry_of)
    }
}

fn clear_map<K, V>(core: &ViewCore<BTreeMap<K, V>>) {
    core.test_write(
        |m| {
            let had = !m.is_empty();
            m.clear();
            had
        },
        |had| *had,
    );
}

/// Equality, hashing and `Debug` for a map-backed view, over the items its
/// `$method` yields. Equality snapshots one side before reading the other.
macro_rules! view_traits {
    (
        $view:ident, $method:ident,
        eq [$($eq:tt)+],
        full_eq [$($full_eq:tt)+],
        hash [$($hash:tt)+],
        debug [$($debug:tt)+]
    ) => {
        impl<K, V> PartialEq for $view<K, V>
        where
            $($eq)+
        {
            fn eq(&self, other: &Self) -> bool {
                let mine = self.to_vec();
                mine == other.to_vec()
            }
        }

        impl<K, V> Eq for $view<K, V> where $($full_eq)+ {}

        impl<K, V> Hash for $view<K, V>
        where
            $($hash)+
        {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.core.read(|m| {
                    state.write_usize(m.len());
                    m.$method().for_each(|item| item.hash(state));
                });
            }
        }

        impl<K, V> fmt::Debug for $view<K, V>
        where
            $($debug)+
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.core.read(|m| f.debug_list().entries(m.$method()).finish())
            }
        }
    };
}

view_traits!(
    PersistentKeys, keys,
    eq [K: Ord + Clone],
    full_eq [K: Ord + Clone],
    hash [K: Hash],
    debug [K: fmt::Debug]
);
view_traits!(
    PersistentValues, values,
    eq [K: Ord, V: Clone + PartialEq],
    full_eq [K: Ord, V: Clone + Eq],
    hash [V: Hash],
    debug [V: fmt::Debug]
);
view_traits!(
    PersistentEntries, iter,
    eq [K: Ord + Clone, V: Clone + PartialEq],
    full_eq [K: Ord + Clone, V: Clone + Eq],
    hash [K: Hash, V: Hash],
    debug [K: fmt::Debug, V: fmt::Debug]
);

/// Cursor over a persisted map in key order, yielding `T` per entry.
///
/// Each step reads under the lock and resumes after the last key returned, so
/// concurrent edits never invalidate the cursor.
pub struct MapCursor<K, V, T> {
    core: ViewCore<BTreeMap<K, V>>,
    last: Option<K>,
    removable: bool,
    project: fn(&K, &V) -> T,
}

pub type KeyCursor<K, V> = MapCursor<K, V, K>;
pub type ValueCursor<K, V> = MapCursor<K, V, V>;
pub type EntryCursor<K, V> = MapCursor<K, V, (K, V)>;

impl<K: Ord, V, T> MapCursor<K, V, T> {
    fn new(core: ViewCore<BTreeMap<K, V>>, project: fn(&K, &V) -> T) -> Self {
        Self {
            core,
            last: None,
            removable: false,
            project,
        }
    }

    /// Remove the entry the last `next` returned.
    pub fn remove(&mut self) -> bool {
        if !std::mem::take(&mut self.removable) {
            return false;
        }
        let Some(last) = &self.last else {
            return false;
        };
        self.core.test_write(|m| m.remove(last).is_some(), |removed| *removed)
    }
}

impl<K: Ord + Clone, V, T> Iterator for MapCursor<K, V, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let project = self.project;
        let (key, item) = self.core.read(|m| {
            let next = match &self.last {
                Some(last) => m.range::<K, _>((Excluded(last), Unbounded)).next(),
                None => m.first_key_value(),
            };
            next.map(|(k, v)| (k.clone(), project(k, v)))
        })?;
        self.last = Some(key);
        self.removable = true;
        Some(item)
    }
}

impl<K: fmt::Debug, V, T> fmt::Debug for MapCursor<K, V, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapCursor")
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}
