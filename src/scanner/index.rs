//! Path index: fixed-capacity hash table of the last observed metadata per path.
//!
//! Buckets are chosen by a polynomial rolling hash over the path bytes and
//! collisions are chained within the bucket. Capacity never changes after
//! construction, so heavy load degrades chains to linear scans rather than
//! triggering a rehash.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::core::errors::{Result, SentinelError};
use crate::platform::pal::{FileKind, FileSystem, FsMetadata};

/// Base of the polynomial path hash.
pub const HASH_PRIME: u64 = 67;

/// Last observed metadata for one path. Owned exclusively by [`PathIndex`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
    pub kind: FileKind,
}

impl FileRecord {
    pub fn from_metadata(path: impl Into<PathBuf>, meta: &FsMetadata) -> Self {
        Self {
            path: path.into(),
            modified: meta.modified,
            size: meta.size,
            kind: meta.kind,
        }
    }

    /// Whether `meta` differs from what was recorded (time or size).
    pub fn differs_from(&self, meta: &FsMetadata) -> bool {
        self.modified != meta.modified || self.size != meta.size
    }

    /// Overwrite time and size in place.
    pub fn refresh(&mut self, meta: &FsMetadata) {
        self.modified = meta.modified;
        self.size = meta.size;
    }
}

/// Fixed-capacity chained hash table keyed by path.
#[derive(Debug)]
pub struct PathIndex {
    capacity: usize,
    buckets: Vec<Vec<FileRecord>>,
    len: usize,
}

impl PathIndex {
    /// Allocate an index with `capacity` buckets.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SentinelError::Capacity {
                what: "path index",
                requested: capacity,
            });
        }
        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(capacity)
            .map_err(|_| SentinelError::Capacity {
                what: "path index",
                requested: capacity,
            })?;
        buckets.resize_with(capacity, Vec::new);
        Ok(Self {
            capacity,
            buckets,
            len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bucket for `path` under this index's capacity.
    pub fn hash(&self, path: &Path) -> usize {
        polynomial_hash(path, self.capacity)
    }

    /// Stat `path` and upsert its record.
    ///
    /// An existing record has its time and size refreshed in place; no
    /// duplicate is ever created. Fails when the path cannot be opened or
    /// stat'd, leaving the index untouched.
    pub fn insert(&mut self, fs: &dyn FileSystem, path: &Path) -> Result<&FileRecord> {
        let meta = fs.stat_metadata(path)?;
        Ok(self.upsert(FileRecord::from_metadata(path, &meta)))
    }

    /// Upsert an already-built record.
    pub fn upsert(&mut self, record: FileRecord) -> &FileRecord {
        let bucket = self.hash(&record.path);
        let chain = &mut self.buckets[bucket];
        if let Some(pos) = chain.iter().position(|r| r.path == record.path) {
            let existing = &mut chain[pos];
            existing.modified = record.modified;
            existing.size = record.size;
            existing.kind = record.kind;
            return existing;
        }
        chain.push(record);
        self.len += 1;
        let last = chain.len() - 1;
        &chain[last]
    }

    /// Exact-match lookup.
    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.buckets[self.hash(path)]
            .iter()
            .find(|r| r.path == path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut FileRecord> {
        let bucket = self.hash(path);
        self.buckets[bucket].iter_mut().find(|r| r.path == path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    /// Unlink the record for `path`.
    pub fn delete(&mut self, path: &Path) -> Result<FileRecord> {
        let bucket = self.hash(path);
        let chain = &mut self.buckets[bucket];
        let pos = chain
            .iter()
            .position(|r| r.path == path)
            .ok_or_else(|| SentinelError::NotIndexed {
                path: path.to_path_buf(),
            })?;
        self.len -= 1;
        Ok(chain.swap_remove(pos))
    }

    /// Remove every record matching `stale`, scanning buckets in order.
    /// Returns the removed records in scan order.
    pub fn remove_if<F>(&mut self, mut stale: F) -> Vec<FileRecord>
    where
        F: FnMut(&FileRecord) -> bool,
    {
        let mut removed = Vec::new();
        for chain in &mut self.buckets {
            let mut i = 0;
            while i < chain.len() {
                if stale(&chain[i]) {
                    removed.push(chain.remove(i));
                } else {
                    i += 1;
                }
            }
        }
        self.len -= removed.len();
        removed
    }

    /// All records, bucket by bucket.
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.buckets.iter().flatten()
    }

    /// Length of the longest collision chain.
    pub fn longest_chain(&self) -> usize {
        self.buckets.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// `Σ c_i · p^i mod capacity` over the path bytes, reduced at every step.
///
/// `capacity` must be non-zero.
pub fn polynomial_hash(path: &Path, capacity: usize) -> usize {
    let modulus = capacity as u64;
    let mut hash: u64 = 0;
    for (i, byte) in path.as_os_str().as_encoded_bytes().iter().enumerate() {
        let term = mul_mod(u64::from(*byte), mod_exp(HASH_PRIME, i as u64, modulus), modulus);
        hash = add_mod(hash, term, modulus);
    }
    #[allow(clippy::cast_possible_truncation)]
    {
        (hash % modulus) as usize
    }
}

/// `base^exp mod modulus` by repeated squaring.
pub fn mod_exp(base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let mut result: u64 = 1;
    let mut base = base % modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, modulus);
        }
        base = mul_mod(base, base, modulus);
        exp >>= 1;
    }
    result
}

#[allow(clippy::cast_possible_truncation)]
fn mul_mod(a: u64, b: u64, modulus: u64) -> u64 {
    ((u128::from(a) * u128::from(b)) % u128::from(modulus)) as u64
}

#[allow(clippy::cast_possible_truncation)]
fn add_mod(a: u64, b: u64, modulus: u64) -> u64 {
    ((u128::from(a) + u128::from(b)) % u128::from(modulus)) as u64
}
