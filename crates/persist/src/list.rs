//! List views, sub-range views and their cursors.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use crate::container::PersistentContainer;
use crate::error::PersistError;
use crate::view::{Identity, Lens, ViewCore, delegate_view};

/// A `Vec` held by a root, either the whole state or a field of it.
pub struct PersistentList<E> {
    core: ViewCore<Vec<E>>,
}

delegate_view!(PersistentList<E> => Vec<E>);

impl<E> Clone for PersistentList<E> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<E: Send + Sync + 'static> PersistentList<E> {
    pub fn new(root: PersistentContainer<Vec<E>>) -> Self {
        Self::project(root, Identity)
    }

    /// View the list a lens selects inside a larger root state.
    pub fn project<T: Send + Sync + 'static>(
        root: PersistentContainer<T>,
        lens: impl Lens<T, Vec<E>>,
    ) -> Self {
        Self {
            core: ViewCore::project(root, lens),
        }
    }
}

fn out_of_bounds(index: usize, len: usize) -> PersistError {
    PersistError::IndexOutOfBounds { index, len }
}

impl<E> PersistentList<E> {
    pub fn len(&self) -> usize {
        self.core.read(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.core.read(Vec::is_empty)
    }

    pub fn get(&self, index: usize) -> Option<E>
    where
        E: Clone,
    {
        self.core.read(|v| v.get(index).cloned())
    }

    pub fn first(&self) -> Option<E>
    where
        E: Clone,
    {
        self.core.read(|v| v.first().cloned())
    }

    pub fn last(&self) -> Option<E>
    where
        E: Clone,
    {
        self.core.read(|v| v.last().cloned())
    }

    pub fn contains(&self, item: &E) -> bool
    where
        E: PartialEq,
    {
        self.core.read(|v| v.contains(item))
    }

    pub fn index_of(&self, item: &E) -> Option<usize>
    where
        E: PartialEq,
    {
        self.core.read(|v| v.iter().position(|e| e == item))
    }

    pub fn last_index_of(&self, item: &E) -> Option<usize>
    where
        E: PartialEq,
    {
        self.core.read(|v| v.iter().rposition(|e| e == item))
    }

    pub fn push(&self, item: E) {
        self.core.write(|v| v.push(item));
    }

    pub fn insert(&self, index: usize, item: E) -> Result<(), PersistError> {
        self.core.test_write(
            |v| {
                if index > v.len() {
                    return Err(out_of_bounds(index, v.len()));
                }
                v.insert(index, item);
                Ok(())
            },
            Result::is_ok,
        )
    }

    /// Replace the element at `index`, returning the previous one.
    pub fn set(&self, index: usize, item: E) -> Result<E, PersistError> {
        self.core.test_write(
            |v| {
                let len = v.len();
                v.get_mut(index)
                    .map(|slot| std::mem::replace(slot, item))
                    .ok_or_else(|| out_of_bounds(index, len))
            },
            Result::is_ok,
        )
    }

    pub fn remove(&self, index: usize) -> Result<E, PersistError> {
        self.core.test_write(
            |v| {
                if index >= v.len() {
                    return Err(out_of_bounds(index, v.len()));
                }
                Ok(v.remove(index))
            },
            Result::is_ok,
        )
    }

    /// Remove the first element equal to `item`.
    pub fn remove_item(&self, item: &E) -> bool
    where
        E: PartialEq,
    {
        self.core.test_write(
            |v| match v.iter().position(|e| e == item) {
                Some(index) => {
                    v.remove(index);
                    true
                }
                None => false,
            },
            |removed| *removed,
        )
    }

    pub fn pop(&self) -> Option<E> {
        self.core.test_write(Vec::pop, Option::is_some)
    }

    pub fn extend(&self, items: impl IntoIterator<Item = E>) {
        let items: Vec<E> = items.into_iter().collect();
        if items.is_empty() {
            return;
        }
        self.core.write(|v| v.extend(items));
    }

    /// Keep only the elements `keep` accepts. Returns whether any were removed.
    pub fn retain(&self, mut keep: impl FnMut(&E) -> bool) -> bool {
        self.core.test_write(
            |v| {
                let before = v.len();
                v.retain(|e| keep(e));
                v.len() != before
            },
            |removed| *removed,
        )
    }

    pub fn clear(&self) {
        self.core.test_write(
            |v| {
                let had = !v.is_empty();
                v.clear();
                had
            },
            |had| *had,
        );
    }

    /// Rewrite every element in place.
    pub fn replace_all(&self, mut f: impl FnMut(&mut E)) {
        self.core.write(|v| v.iter_mut().for_each(|e| f(e)));
    }

    pub fn sort_by(&self, compare: impl FnMut(&E, &E) -> Ordering) {
        self.core.write(|v| v.sort_by(compare));
    }

    pub fn to_vec(&self) -> Vec<E>
    where
        E: Clone,
    {
        self.core.read(Vec::clone)
    }

    /// Live cursor over the whole list.
    pub fn iter(&self) -> ListCursor<E> {
        ListCursor {
            core: self.core.clone(),
            next: 0,
            end: End::Live,
            last: None,
        }
    }

    /// Live view of `start..end`. Structural changes made through the
    /// sub-list move its end with them.
    pub fn sub_list(&self, start: usize, end: usize) -> Result<PersistentSubList<E>, PersistError> {
        let len = self.len();
        if start > end || end > len {
            return Err(PersistError::RangeOutOfBounds { start, end, len });
        }
        Ok(PersistentSubList {
            core: self.core.clone(),
            start,
            ends: vec![Arc::new(AtomicUsize::new(end))],
        })
    }
}

impl<E: Clone + PartialEq> PartialEq for PersistentList<E> {
    fn eq(&self, other: &Self) -> bool {
        self.core.eq_with(&other.core)
    }
}

impl<E: Clone + Eq> Eq for PersistentList<E> {}

impl<E: Hash> Hash for PersistentList<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.read(|v| v.hash(state));
    }
}

impl<E: fmt::Debug> fmt::Debug for PersistentList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.read(|v| f.debug_list().entries(v).finish())
    }
}

/// Window `start..end` over a persisted list.
///
/// `ends` holds the ends of the sub-lists this one was derived from, outermost
/// first, then its own. Structural edits shift all of them.
pub struct PersistentSubList<E> {
    core: ViewCore<Vec<E>>,
    start: usize,
    ends: Vec<Arc<AtomicUsize>>,
}

delegate_view!(PersistentSubList<E>);

impl<E> Clone for PersistentSubList<E> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            start: self.start,
            ends: self.ends.clone(),
        }
    }
}

impl<E> PersistentSubList<E> {
    fn end_in(&self, len: usize) -> usize {
        let end = self.ends.last().map_or(self.start, |e| e.load(AtomicOrdering::Acquire));
        end.min(len)
    }

    fn span(&self, v: &[E]) -> (usize, usize) {
        let end = self.end_in(v.len());
        (self.start.min(end), end)
    }

    fn shift_ends(&self, grow: bool, by: usize) {
        for end in &self.ends {
            if grow {
                end.fetch_add(by, AtomicOrdering::AcqRel);
            } else {
                end.fetch_sub(by, AtomicOrdering::AcqRel);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.core.read(|v| {
            let (start, end) = self.span(v);
            end - start
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<E>
    where
        E: Clone,
    {
        self.core.read(|v| {
            let (start, end) = self.span(v);
            v[start..end].get(index).cloned()
        })
    }

    pub fn set(&self, index: usize, item: E) -> Result<E, PersistError> {
        self.core.test_write(
            |v| {
                let (start, end) = self.span(v);
                v[start..end]
                    .get_mut(index)
                    .map(|slot| std::mem::replace(slot, item))
                    .ok_or_else(|| out_of_bounds(index, end - start))
            },
            Result::is_ok,
        )
    }

    /// Append at the end of the window.
    pub fn push(&self, item: E) {
        self.core.write(|v| {
            let (_, end) = self.span(v);
            v.insert(end, item);
            self.shift_ends(true, 1);
        });
    }

    pub fn insert(&self, index: usize, item: E) -> Result<(), PersistError> {
        self.core.test_write(
            |v| {
                let (start, end) = self.span(v);
                if index > end - start {
                    return Err(out_of_bounds(index, end - start));
                }
                v.insert(start + index, item);
                self.shift_ends(true, 1);
                Ok(())
            },
            Result::is_ok,
        )
    }

    pub fn remove(&self, index: usize) -> Result<E, PersistError> {
        self.core.test_write(
            |v| {
                let (start, end) = self.span(v);
                if index >= end - start {
                    return Err(out_of_bounds(index, end - start));
                }
                let removed = v.remove(start + index);
                self.shift_ends(false, 1);
                Ok(removed)
            },
            Result::is_ok,
        )
    }

    /// Remove the window's elements from the backing list.
    pub fn clear(&self) {
        self.core.test_write(
            |v| {
                let (start, end) = self.span(v);
                let count = end - start;
                v.drain(start..end);
                self.shift_ends(false, count);
                count
            },
            |count| *count > 0,
        );
    }

    pub fn to_vec(&self) -> Vec<E>
    where
        E: Clone,
    {
        self.core.read(|v| {
            let (start, end) = self.span(v);
            v[start..end].to_vec()
        })
    }

    pub fn iter(&self) -> ListCursor<E> {
        ListCursor {
            core: self.core.clone(),
            next: self.start,
            end: End::Shared(self.ends.clone()),
            last: None,
        }
    }

    pub fn sub_list(&self, start: usize, end: usize) -> Result<PersistentSubList<E>, PersistError> {
        let len = self.len();
        if start > end || end > len {
            return Err(PersistError::RangeOutOfBounds { start, end, len });
        }
        let mut ends = self.ends.clone();
        ends.push(Arc::new(AtomicUsize::new(self.start + end)));
        Ok(PersistentSubList {
            core: self.core.clone(),
            start: self.start + start,
            ends,
        })
    }
}

impl<E: Clone + PartialEq> PartialEq for PersistentSubList<E> {
    fn eq(&self, other: &Self) -> bool {
        let mine = self.to_vec();
        mine == other.to_vec()
    }
}

impl<E: Clone + Eq> Eq for PersistentSubList<E> {}

impl<E: Hash> Hash for PersistentSubList<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core.read(|v| {
            let (start, end) = self.span(v);
            v[start..end].hash(state);
        });
    }
}

impl<E: fmt::Debug> fmt::Debug for PersistentSubList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.read(|v| {
            let (start, end) = self.span(v);
            f.debug_list().entries(&v[start..end]).finish()
        })
    }
}

enum End {
    /// Tracks the list's current length.
    Live,
    /// Tracks a sub-list's end.
    Shared(Vec<Arc<AtomicUsize>>),
    /// Fixed by a split.
    Fixed(usize),
}

/// Cursor over a persisted list.
///
/// Each step takes the read lock once, so the cursor sees concurrent edits and
/// never holds the lock between steps.
pub struct ListCursor<E> {
    core: ViewCore<Vec<E>>,
    next: usize,
    end: End,
    last: Option<usize>,
}

impl<E> ListCursor<E> {
    fn end_in(&self, len: usize) -> usize {
        match &self.end {
            End::Live => len,
            End::Shared(ends) => ends
                .last()
                .map_or(len, |e| e.load(AtomicOrdering::Acquire))
                .min(len),
            End::Fixed(end) => (*end).min(len),
        }
    }

    /// Remove the element the last `next` returned. Returns it, or `None` if
    /// nothing was returned since the last removal or it is already gone.
    pub fn remove(&mut self) -> Option<E> {
        let index = self.last.take()?;
        let removed = self.core.test_write(
            |v| {
                if index >= v.len() {
                    return None;
                }
                if let End::Shared(ends) = &self.end {
                    for end in ends {
                        end.fetch_sub(1, AtomicOrdering::AcqRel);
                    }
                }
                Some(v.remove(index))
            },
            Option::is_some,
        );
        if removed.is_some() {
            self.next = index;
            if let End::Fixed(end) = &mut self.end {
                *end = end.saturating_sub(1);
            }
        }
        removed
    }

    /// Replace the element the last `next` returned.
    pub fn set(&mut self, item: E) -> Result<E, PersistError> {
        let index = self.last.ok_or(PersistError::NoCurrentElement)?;
        self.core.test_write(
            |v| {
                let len = v.len();
                v.get_mut(index)
                    .map(|slot| std::mem::replace(slot, item))
                    .ok_or_else(|| out_of_bounds(index, len))
            },
            Result::is_ok,
        )
    }

    /// Split off the first half of the remaining range as an independent cursor
    /// on the same list. `None` when fewer than two elements remain.
    pub fn try_split(&mut self) -> Option<ListCursor<E>> {
        let end = self.core.read(|v| self.end_in(v.len()));
        if end.saturating_sub(self.next) < 2 {
            return None;
        }
        let mid = self.next + (end - self.next) / 2;
        let prefix = ListCursor {
            core: self.core.clone(),
            next: self.next,
            end: End::Fixed(mid),
            last: None,
        };
        self.next = mid;
        self.end = End::Fixed(end);
        self.last = None;
        Some(prefix)
    }
}

impl<E: Clone> Iterator for ListCursor<E> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        let index = self.next;
        let item = self.core.read(|v| {
            if index < self.end_in(v.len()) {
                v.get(index).cloned()
            } else {
                None
            }
        })?;
        self.last = Some(index);
        self.next = index + 1;
        Some(item)
    }
}

impl<E> fmt::Debug for ListCursor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListCursor")
            .field("next", &self.next)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerConfig;
    use crate::data::{LockedAccess, PersistentData};
    use crate::json::JsonCodec;

    fn list_with(items: Vec<u32>) -> (tempfile::TempDir, PersistentList<u32>) {
        let tmp = tempfile::tempdir().unwrap();
        let root = PersistentContainer::open_with(
            tmp.path().join("list.json"),
            Vec::new,
            JsonCodec::new(),
            ContainerConfig {
                background_writer: false,
                ..ContainerConfig::default()
            },
        )
        .unwrap();
        let list = PersistentList::new(root);
        list.extend(items);
        list.flush().unwrap();
        (tmp, list)
    }

    #[test]
    fn positional_queries() {
        let (_tmp, list) = list_with(vec![4, 8, 4, 1]);
        assert_eq!(list.len(), 4);
        assert_eq!(list.get(1), Some(8));
        assert_eq!(list.get(9), None);
        assert_eq!(list.first(), Some(4));
        assert_eq!(list.last(), Some(1));
        assert_eq!(list.index_of(&4), Some(0));
        assert_eq!(list.last_index_of(&4), Some(2));
        assert!(!list.contains(&7));
        assert!(!list.is_dirty());
    }

    #[test]
    fn failed_edits_leave_root_clean() {
        let (_tmp, list) = list_with(vec![1, 2]);
        assert!(matches!(
            list.insert(5, 9),
            Err(PersistError::IndexOutOfBounds { index: 5, len: 2 })
        ));
        assert!(list.set(2, 9).is_err());
        assert!(list.remove(7).is_err());
        assert!(!list.remove_item(&42));
        assert!(!list.retain(|_| true));
        assert!(!list.is_dirty());

        let (_tmp, empty) = list_with(Vec::new());
        assert_eq!(empty.pop(), None);
        empty.clear();
        empty.extend(Vec::new());
        assert!(!empty.is_dirty());
    }

    #[test]
    fn edits_mark_dirty() {
        let (_tmp, list) = list_with(vec![3, 1, 2]);
        assert_eq!(list.set(0, 30).unwrap(), 3);
        assert!(list.is_dirty());
        list.sort_by(|a, b| a.cmp(b));
        assert_eq!(list.to_vec(), vec![1, 2, 30]);
        list.replace_all(|e| *e *= 2);
        assert_eq!(list.to_vec(), vec![2, 4, 60]);
        assert!(list.remove_item(&4));
        assert_eq!(list.pop(), Some(60));
        assert_eq!(list.to_vec(), vec![2]);
    }

    #[test]
    fn cursor_remove_during_traversal() {
        let (_tmp, list) = list_with(vec![1, 2, 3, 4, 5]);
        let mut cursor = list.iter();
        while let Some(item) = cursor.next() {
            if item % 2 == 0 {
                assert_eq!(cursor.remove(), Some(item));
            }
        }
        assert_eq!(list.to_vec(), vec![1, 3, 5]);
        assert!(list.is_dirty());

        let mut fresh = list.iter();
        assert_eq!(fresh.remove(), None);
    }

    #[test]
    fn cursor_set_replaces_last_returned() {
        let (_tmp, list) = list_with(vec![1, 2]);
        let mut cursor = list.iter();
        assert!(matches!(cursor.set(0), Err(PersistError::NoCurrentElement)));
        cursor.next();
        assert_eq!(cursor.set(10).unwrap(), 1);
        assert_eq!(list.to_vec(), vec![10, 2]);
    }

    #[test]
    fn split_cursors_cover_the_range_once() {
        let (_tmp, list) = list_with((0..9).collect());
        let mut suffix = list.iter();
        suffix.next();
        let mut prefix = suffix.try_split().unwrap();
        let left: Vec<u32> = prefix.by_ref().collect();
        let right: Vec<u32> = suffix.collect();
        assert_eq!(left, vec![1, 2, 3, 4]);
        assert_eq!(right, vec![5, 6, 7, 8]);

        let mut tail = list.iter();
        for _ in 0..8 {
            tail.next();
        }
        assert!(tail.try_split().is_none());
    }

    #[test]
    fn sub_list_tracks_its_window() {
        let (_tmp, list) = list_with(vec![0, 1, 2, 3, 4, 5]);
        let window = list.sub_list(1, 4).unwrap();
        assert_eq!(window.to_vec(), vec![1, 2, 3]);

        window.push(9);
        assert_eq!(window.to_vec(), vec![1, 2, 3, 9]);
        assert_eq!(list.to_vec(), vec![0, 1, 2, 3, 9, 4, 5]);

        assert_eq!(window.remove(0).unwrap(), 1);
        window.insert(0, 7).unwrap();
        assert_eq!(window.set(1, 20).unwrap(), 2);
        assert_eq!(window.to_vec(), vec![7, 20, 3, 9]);

        let inner = window.sub_list(1, 3).unwrap();
        inner.clear();
        assert!(inner.is_empty());
        assert_eq!(window.to_vec(), vec![7, 9]);
        assert_eq!(list.to_vec(), vec![0, 7, 9, 4, 5]);
        assert!(list.is_dirty());
    }

    #[test]
    fn sub_list_cursor_stays_in_window() {
        let (_tmp, list) = list_with(vec![0, 1, 2, 3, 4]);
        let window = list.sub_list(1, 4).unwrap();
        let mut cursor = window.iter();
        cursor.next();
        assert_eq!(cursor.remove(), Some(1));
        let rest: Vec<u32> = cursor.collect();
        assert_eq!(rest, vec![2, 3]);
        assert_eq!(window.len(), 2);
        assert_eq!(list.to_vec(), vec![0, 2, 3, 4]);
    }

    #[test]
    fn sub_list_bounds_checked() {
        let (_tmp, list) = list_with(vec![1, 2, 3]);
        assert!(matches!(
            list.sub_list(2, 5),
            Err(PersistError::RangeOutOfBounds { start: 2, end: 5, len: 3 })
        ));
        assert!(list.sub_list(2, 1).is_err());
        assert!(list.sub_list(3, 3).unwrap().is_empty());
    }

    #[test]
    fn equality_hash_and_debug_follow_contents() {
        use std::collections::hash_map::DefaultHasher;

        let (_a, left) = list_with(vec![1, 2]);
        let (_b, right) = list_with(vec![1, 2]);
        assert_eq!(left, right);
        assert_eq!(left, left.clone());

        let digest = |l: &PersistentList<u32>| {
            let mut h = DefaultHasher::new();
            l.hash(&mut h);
            h.finish()
        };
        assert_eq!(digest(&left), digest(&right));
        assert_eq!(format!("{left:?}"), "[1, 2]");

        right.push(3);
        assert_ne!(left, right);
    }

    #[test]
    fn locked_access_spans_several_edits() {
        let (_tmp, list) = list_with(vec![1]);
        let total = list.write_locked(|v| {
            v.push(2);
            v.push(3);
            v.iter().sum::<u32>()
        });
        assert_eq!(total, 6);
        assert_eq!(list.read_locked(|v| v.len()), 3);
    }
}
