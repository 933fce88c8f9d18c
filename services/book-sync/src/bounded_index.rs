//! Sorted index with a visible head of bounded size
//!
//! Stores every element it is given but only the first `limit` elements
//! (by `Ord`) are visible. Each mutation reports which element entered and
//! which left the visible head, so callers can emit add/remove
//! notifications in O(limit) regardless of how many elements are stored.
//!
//! Backed by a `BTreeSet` for deterministic iteration. Rank queries walk
//! at most `limit` elements.

use std::collections::BTreeSet;
use std::ops::Bound;

/// Elements that crossed the visibility boundary in one mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexChange<K> {
    /// Element that became visible.
    pub entered: Option<K>,
    /// Element that stopped being visible.
    pub evicted: Option<K>,
}

impl<K> IndexChange<K> {
    pub fn none() -> Self {
        Self {
            entered: None,
            evicted: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.entered.is_none() && self.evicted.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct BoundedIndex<K> {
    entries: BTreeSet<K>,
    /// Visible head size; `None` means every element is visible.
    limit: Option<usize>,
}

impl<K: Ord + Clone> BoundedIndex<K> {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            entries: BTreeSet::new(),
            limit,
        }
    }

    /// Insert `key`.
    ///
    /// If it lands inside the visible head it is reported as entered, along
    /// with the element pushed out to rank `limit`, if any. Inserting a key
    /// that is already present changes nothing.
    pub fn insert(&mut self, key: K) -> IndexChange<K> {
        if !self.entries.insert(key.clone()) {
            return IndexChange::none();
        }
        let Some(limit) = self.limit else {
            return IndexChange {
                entered: Some(key),
                evicted: None,
            };
        };
        if !self.ranks_below(&key, limit) {
            return IndexChange::none();
        }
        let evicted = if self.entries.len() > limit {
            self.entries.iter().nth(limit).cloned()
        } else {
            None
        };
        IndexChange {
            entered: Some(key),
            evicted,
        }
    }

    /// Remove `key`.
    ///
    /// If it was visible it is reported as evicted, along with the element
    /// that rose into rank `limit - 1`, if any.
    pub fn remove(&mut self, key: &K) -> IndexChange<K> {
        let was_visible = match self.limit {
            None => true,
            Some(limit) => self.entries.contains(key) && self.ranks_below(key, limit),
        };
        if !self.entries.remove(key) || !was_visible {
            return IndexChange::none();
        }
        let entered = match self.limit {
            Some(limit) if self.entries.len() >= limit && limit > 0 => {
                self.entries.iter().nth(limit - 1).cloned()
            }
            _ => None,
        };
        IndexChange {
            entered,
            evicted: Some(key.clone()),
        }
    }

    /// Smallest visible element.
    pub fn head_min(&self) -> Option<&K> {
        match self.limit {
            Some(0) => None,
            _ => self.entries.first(),
        }
    }

    /// Largest element within the visible head.
    pub fn head_max(&self) -> Option<&K> {
        match self.limit {
            None => self.entries.last(),
            Some(0) => None,
            Some(limit) if self.entries.len() < limit => self.entries.last(),
            Some(limit) => self.entries.iter().nth(limit - 1),
        }
    }

    /// Visible elements in order.
    pub fn visible(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().take(self.limit.unwrap_or(usize::MAX))
    }

    /// Total stored elements, visible or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether fewer than `limit` stored elements sort before `key`.
    fn ranks_below(&self, key: &K, limit: usize) -> bool {
        let before = self
            .entries
            .range::<K, _>((Bound::Unbounded, Bound::Excluded(key)))
            .take(limit)
            .count();
        before < limit
    }
}
