//! Filesystem abstraction consumed by the mirror engine.
//!
//! Every descriptor opened here is scoped to a single call: acquired right
//! before use and dropped on every exit path, never held across recursion.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::core::errors::{Result, SentinelError};

/// Kind of filesystem entry the engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    File,
    Directory,
    /// Sockets, FIFOs, devices. Indexed, never mirrored.
    Other,
}

/// Structural metadata for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsMetadata {
    pub modified: SystemTime,
    pub size: u64,
    pub kind: FileKind,
    /// Unix permission bits (0 on other platforms).
    pub mode: u32,
}

/// How `copy_file_content` opens the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Create the destination (or truncate it if present).
    Create,
    /// Truncate an existing destination; fail if it is missing.
    Overwrite,
}

/// Filesystem operations the engine needs.
pub trait FileSystem: Send + Sync {
    fn stat_metadata(&self, path: &Path) -> Result<FsMetadata>;
    fn list_dir(&self, path: &Path) -> Result<Vec<OsString>>;
    fn exists(&self, path: &Path) -> bool;
    fn create_dir(&self, path: &Path, mode: Option<u32>) -> Result<()>;
    /// Copy `from` into `to`; returns the number of bytes written.
    fn copy_file_content(
        &self,
        from: &Path,
        to: &Path,
        mode: CopyMode,
        permissions: Option<u32>,
    ) -> Result<u64>;
    /// Unlink a file or remove an empty directory.
    fn remove_path(&self, path: &Path) -> Result<()>;
}

/// `FileSystem` backed by `std::fs`.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    chunk_size: usize,
}

impl LocalFileSystem {
    /// `chunk_size` is clamped to at least one byte.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for LocalFileSystem {
    fn default() -> Self {
        Self::new(256)
    }
}

impl FileSystem for LocalFileSystem {
    fn stat_metadata(&self, path: &Path) -> Result<FsMetadata> {
        let meta = fs::metadata(path).map_err(|e| SentinelError::stat(path, e))?;
        let kind = if meta.is_dir() {
            FileKind::Directory
        } else if meta.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        };

        // Readability check: an entry we cannot open cannot be mirrored.
        if kind != FileKind::Other {
            drop(File::open(path).map_err(|e| SentinelError::stat(path, e))?);
        }

        Ok(FsMetadata {
            modified: meta.modified().unwrap_or(UNIX_EPOCH),
            size: meta.len(),
            kind,
            mode: permission_bits(&meta),
        })
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<OsString>> {
        let entries = fs::read_dir(path).map_err(|e| SentinelError::io(path, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SentinelError::io(path, e))?;
            names.push(entry.file_name());
        }
        Ok(names)
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn create_dir(&self, path: &Path, mode: Option<u32>) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path).map_err(|e| SentinelError::io(path, e))
    }

    fn copy_file_content(
        &self,
        from: &Path,
        to: &Path,
        mode: CopyMode,
        permissions: Option<u32>,
    ) -> Result<u64> {
        let mut reader = File::open(from).map_err(|e| SentinelError::io(from, e))?;

        let mut options = OpenOptions::new();
        options.write(true).truncate(true);
        if mode == CopyMode::Create {
            options.create(true);
        }
        #[cfg(unix)]
        if let Some(bits) = permissions {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(bits);
        }
        #[cfg(not(unix))]
        let _ = permissions;
        let mut writer = options.open(to).map_err(|e| SentinelError::io(to, e))?;

        let mut buf = vec![0u8; self.chunk_size];
        let mut total: u64 = 0;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(SentinelError::Copy {
                        from: from.to_path_buf(),
                        to: to.to_path_buf(),
                        source,
                    });
                }
            };
            writer
                .write_all(&buf[..n])
                .map_err(|source| SentinelError::Copy {
                    from: from.to_path_buf(),
                    to: to.to_path_buf(),
                    source,
                })?;
            total += n as u64;
        }
        writer.flush().map_err(|e| SentinelError::io(to, e))?;
        Ok(total)
    }

    fn remove_path(&self, path: &Path) -> Result<()> {
        let meta = fs::symlink_metadata(path).map_err(|e| SentinelError::io(path, e))?;
        if meta.is_dir() {
            fs::remove_dir(path).map_err(|e| SentinelError::io(path, e))
        } else {
            fs::remove_file(path).map_err(|e| SentinelError::io(path, e))
        }
    }
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(_meta: &fs::Metadata) -> u32 {
    0
}

// ──────────────────── recording wrapper ────────────────────

/// A mutating operation observed by [`RecordingFileSystem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOp {
    CreateDir(PathBuf),
    Copy { from: PathBuf, to: PathBuf },
    Remove(PathBuf),
}

/// Wraps [`LocalFileSystem`], records every mutation in order, and fails
/// operations on chosen paths. Used by tests and dry diagnostics.
#[derive(Debug, Default)]
pub struct RecordingFileSystem {
    inner: LocalFileSystem,
    ops: Mutex<Vec<FsOp>>,
    failing: Mutex<HashSet<PathBuf>>,
}

impl RecordingFileSystem {
    pub fn new(inner: LocalFileSystem) -> Self {
        Self {
            inner,
            ops: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make every operation touching `path` fail with a permission error.
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.failing.lock().insert(path.into());
    }

    /// Stop injecting failures for `path`.
    pub fn heal(&self, path: &Path) {
        self.failing.lock().remove(path);
    }

    /// Mutations recorded so far, in call order.
    pub fn ops(&self) -> Vec<FsOp> {
        self.ops.lock().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().clear();
    }

    fn check(&self, path: &Path) -> Result<()> {
        if self.failing.lock().contains(path) {
            return Err(SentinelError::io(
                path,
                std::io::Error::new(ErrorKind::PermissionDenied, "injected failure"),
            ));
        }
        Ok(())
    }
}

impl FileSystem for RecordingFileSystem {
    fn stat_metadata(&self, path: &Path) -> Result<FsMetadata> {
        if self.failing.lock().contains(path) {
            return Err(SentinelError::stat(
                path,
                std::io::Error::new(ErrorKind::PermissionDenied, "injected failure"),
            ));
        }
        self.inner.stat_metadata(path)
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<OsString>> {
        self.check(path)?;
        self.inner.list_dir(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn create_dir(&self, path: &Path, mode: Option<u32>) -> Result<()> {
        self.ops.lock().push(FsOp::CreateDir(path.to_path_buf()));
        self.check(path)?;
        self.inner.create_dir(path, mode)
    }

    fn copy_file_content(
        &self,
        from: &Path,
        to: &Path,
        mode: CopyMode,
        permissions: Option<u32>,
    ) -> Result<u64> {
        self.ops.lock().push(FsOp::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });
        self.check(from)?;
        self.check(to)?;
        self.inner.copy_file_content(from, to, mode, permissions)
    }

    fn remove_path(&self, path: &Path) -> Result<()> {
        self.ops.lock().push(FsOp::Remove(path.to_path_buf()));
        self.check(path)?;
        self.inner.remove_path(path)
    }
}
