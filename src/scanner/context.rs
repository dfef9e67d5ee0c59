//! Long-lived engine state: the path index plus the three per-cycle change lists.

#![allow(missing_docs)]

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::scanner::changes::ChangeList;
use crate::scanner::index::PathIndex;

/// Everything the walker and reconciler share, owned by the daemon.
///
/// The index lives for the whole process; the lists are reset after every
/// cycle and keep their storage.
#[derive(Debug)]
pub struct CycleContext {
    pub index: PathIndex,
    pub created: ChangeList,
    pub modified: ChangeList,
    pub deleted: ChangeList,
}

impl CycleContext {
    pub fn new(index_capacity: usize, list_capacity: usize) -> Result<Self> {
        Ok(Self {
            index: PathIndex::with_capacity(index_capacity)?,
            created: ChangeList::with_capacity(list_capacity)?,
            modified: ChangeList::with_capacity(list_capacity)?,
            deleted: ChangeList::with_capacity(list_capacity)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.index.capacity, config.lists.initial_capacity)
    }

    /// Clear the three lists for the next cycle.
    pub fn reset(&mut self) {
        self.created.clear();
        self.modified.clear();
        self.deleted.clear();
    }

    /// Whether this cycle observed no change at all.
    pub fn is_quiet(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// `(created, modified, deleted)` counts.
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.created.len(), self.modified.len(), self.deleted.len())
    }
}
