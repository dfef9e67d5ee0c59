//! Per-cycle change lists: growable ordered path collections with a stable
//! length ordering used to sequence tree mutations.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use crate::core::errors::{Result, SentinelError};
use crate::core::paths::path_len;

/// Ordering direction for [`ChangeList::sort_by_length`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Shortest first: parents before children.
    Ascending,
    /// Longest first: children before parents.
    Descending,
}

/// Ordered paths discovered during one cycle.
///
/// Cleared (not reallocated) between cycles so steady state reuses the
/// backing storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeList {
    items: Vec<PathBuf>,
}

impl ChangeList {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut items = Vec::new();
        items
            .try_reserve_exact(capacity)
            .map_err(|_| SentinelError::Capacity {
                what: "change list",
                requested: capacity,
            })?;
        Ok(Self { items })
    }

    /// Append a path, doubling the backing storage when full.
    pub fn append(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        if self.items.len() == self.items.capacity() {
            let extra = self.items.capacity().max(1);
            self.items
                .try_reserve_exact(extra)
                .map_err(|_| SentinelError::Capacity {
                    what: "change list",
                    requested: self.items.capacity().saturating_add(extra),
                })?;
        }
        self.items.push(path.into());
        Ok(())
    }

    /// Drop every entry; backing capacity is retained.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Bounds-checked fetch.
    pub fn get(&self, i: usize) -> Option<&Path> {
        self.items.get(i).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.items.iter().any(|p| p == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.items.iter().map(PathBuf::as_path)
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.items
    }

    /// Stable sort keyed on path string length only.
    ///
    /// A directory path is always strictly shorter than anything nested under
    /// it, so ascending order materializes parents first and descending order
    /// empties children first. Equal-length entries keep discovery order.
    pub fn sort_by_length(&mut self, direction: SortDirection) {
        // `sort_by_key` is stable; `sort_unstable_by_key` would reorder siblings.
        match direction {
            SortDirection::Ascending => self.items.sort_by_key(|p| path_len(p)),
            SortDirection::Descending => self
                .items
                .sort_by(|a, b| path_len(b).cmp(&path_len(a))),
        }
    }
}

impl<'a> IntoIterator for &'a ChangeList {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
