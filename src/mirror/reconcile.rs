//! Reconciliation: apply one cycle's change lists to the destination tree.
//!
//! Three phases run in a fixed order: insert (Created, shortest path first),
//! update (Modified, discovery order), delete (Deleted, longest path first).
//! Length ordering is what makes the tree mutations safe: a parent directory is
//! always shorter than anything inside it, so it is created before its children
//! and removed after them.
//!
//! A failure on one path is reported and the phase moves on to the next path.
//! Each phase keeps its own tally so the cycle outcome can say which phase
//! went wrong.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::core::errors::SentinelError;
use crate::core::paths::mirror_path;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::platform::pal::{CopyMode, FileKind, FileSystem};
use crate::scanner::changes::{ChangeList, SortDirection};
use crate::scanner::context::CycleContext;

/// Reconciliation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Insert,
    Update,
    Delete,
}

impl SyncPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Tally for one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseReport {
    pub applied: usize,
    pub failed: usize,
    /// Nothing to do (already in place, already gone, or not mirrorable).
    pub skipped: usize,
}

impl PhaseReport {
    pub const fn ok(&self) -> bool {
        self.failed == 0
    }
}

/// A single item failure.
#[derive(Debug, Clone)]
pub struct SyncError {
    pub phase: SyncPhase,
    pub path: PathBuf,
    pub error: String,
    pub error_code: String,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub insert: PhaseReport,
    pub update: PhaseReport,
    pub delete: PhaseReport,
    pub errors: Vec<SyncError>,
    pub duration: Duration,
}

impl ReconcileReport {
    /// Whether every phase succeeded.
    pub const fn ok(&self) -> bool {
        self.insert.ok() && self.update.ok() && self.delete.ok()
    }

    pub const fn failures(&self) -> usize {
        self.insert.failed + self.update.failed + self.delete.failed
    }
}

/// Applies change lists from a source tree onto its mirror.
pub struct Reconciler<'a> {
    fs: &'a dyn FileSystem,
    src_root: &'a Path,
    dest_root: &'a Path,
    preserve_permissions: bool,
    logger: Option<&'a ActivityLoggerHandle>,
}

impl<'a> Reconciler<'a> {
    pub fn new(fs: &'a dyn FileSystem, src_root: &'a Path, dest_root: &'a Path) -> Self {
        Self {
            fs,
            src_root,
            dest_root,
            preserve_permissions: true,
            logger: None,
        }
    }

    #[must_use]
    pub fn preserve_permissions(mut self, preserve: bool) -> Self {
        self.preserve_permissions = preserve;
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Option<&'a ActivityLoggerHandle>) -> Self {
        self.logger = logger;
        self
    }

    /// Run insert, update and delete in that order.
    ///
    /// Sorts `created` and `deleted` in place; the caller resets the lists afterwards.
    pub fn reconcile(&self, ctx: &mut CycleContext) -> ReconcileReport {
        let start = Instant::now();
        let mut report = ReconcileReport::default();

        report.insert = self.insert_phase(&mut ctx.created, &mut report.errors);
        report.update = self.update_phase(&ctx.modified, &mut report.errors);
        report.delete = self.delete_phase(&mut ctx.deleted, &mut report.errors);

        report.duration = start.elapsed();
        report
    }

    /// Materialize newly discovered source entries, parents first.
    pub fn insert_phase(&self, created: &mut ChangeList, errors: &mut Vec<SyncError>) -> PhaseReport {
        created.sort_by_length(SortDirection::Ascending);
        let mut tally = PhaseReport::default();

        for src in created.iter() {
            let dest = match mirror_path(src, self.src_root, self.dest_root) {
                Ok(dest) => dest,
                Err(e) => {
                    self.record_failure(&mut tally, errors, SyncPhase::Insert, src, &e);
                    continue;
                }
            };
            // The entry may have changed or vanished since it was detected.
            let meta = match self.fs.stat_metadata(src) {
                Ok(meta) => meta,
                Err(e) => {
                    self.record_failure(&mut tally, errors, SyncPhase::Insert, src, &e);
                    continue;
                }
            };
            let mode = self.preserve_permissions.then_some(meta.mode);

            match meta.kind {
                FileKind::Directory => match self.fs.create_dir(&dest, mode) {
                    Ok(()) => {
                        tally.applied += 1;
                        self.log_event(ActivityEvent::EntryCreated {
                            path: src.to_path_buf(),
                            dest,
                            bytes: None,
                        });
                    }
                    Err(_) if self.fs.stat_metadata(&dest).is_ok_and(|m| m.kind == FileKind::Directory) => {
                        tally.skipped += 1;
                    }
                    Err(e) => self.record_failure(&mut tally, errors, SyncPhase::Insert, src, &e),
                },
                FileKind::File => match self.fs.copy_file_content(src, &dest, CopyMode::Create, mode) {
                    Ok(bytes) => {
                        tally.applied += 1;
                        self.log_event(ActivityEvent::EntryCreated {
                            path: src.to_path_buf(),
                            dest,
                            bytes: Some(bytes),
                        });
                    }
                    Err(e) => self.record_failure(&mut tally, errors, SyncPhase::Insert, src, &e),
                },
                FileKind::Other => tally.skipped += 1,
            }
        }

        tally
    }

    /// Rewrite the destination counterpart of every modified file.
    ///
    /// The destination must already exist; it is truncated and rewritten, never created.
    pub fn update_phase(&self, modified: &ChangeList, errors: &mut Vec<SyncError>) -> PhaseReport {
        let mut tally = PhaseReport::default();

        for src in modified.iter() {
            let result = mirror_path(src, self.src_root, self.dest_root).and_then(|dest| {
                self.fs
                    .copy_file_content(src, &dest, CopyMode::Overwrite, None)
                    .map(|bytes| (dest, bytes))
            });
            match result {
                Ok((dest, bytes)) => {
                    tally.applied += 1;
                    self.log_event(ActivityEvent::EntryUpdated {
                        path: src.to_path_buf(),
                        dest,
                        bytes,
                    });
                }
                Err(e) => self.record_failure(&mut tally, errors, SyncPhase::Update, src, &e),
            }
        }

        tally
    }

    /// Remove destination counterparts of deleted source entries, children first.
    pub fn delete_phase(&self, deleted: &mut ChangeList, errors: &mut Vec<SyncError>) -> PhaseReport {
        deleted.sort_by_length(SortDirection::Descending);
        let mut tally = PhaseReport::default();

        for src in deleted.iter() {
            let dest = match mirror_path(src, self.src_root, self.dest_root) {
                Ok(dest) => dest,
                Err(e) => {
                    self.record_failure(&mut tally, errors, SyncPhase::Delete, src, &e);
                    continue;
                }
            };
            // The mirror root is owned by the operator, not by the sync.
            if dest == self.dest_root || !self.fs.exists(&dest) {
                tally.skipped += 1;
                continue;
            }
            match self.fs.remove_path(&dest) {
                Ok(()) => {
                    tally.applied += 1;
                    self.log_event(ActivityEvent::EntryRemoved {
                        path: src.to_path_buf(),
                        dest,
                    });
                }
                Err(e) => self.record_failure(&mut tally, errors, SyncPhase::Delete, src, &e),
            }
        }

        tally
    }

    // ──────────────────── logging helpers ────────────────────

    fn record_failure(
        &self,
        tally: &mut PhaseReport,
        errors: &mut Vec<SyncError>,
        phase: SyncPhase,
        path: &Path,
        err: &SentinelError,
    ) {
        tally.failed += 1;
        eprintln!(
            "[SNT-SYNC] {} failed for {}: {err}",
            phase.as_str(),
            path.display()
        );
        self.log_event(ActivityEvent::SyncFailed {
            phase: phase.as_str(),
            path: path.to_path_buf(),
            error_code: err.code().to_string(),
            error_message: err.to_string(),
        });
        errors.push(SyncError {
            phase,
            path: path.to_path_buf(),
            error: err.to_string(),
            error_code: err.code().to_string(),
        });
    }

    fn log_event(&self, event: ActivityEvent) {
        if let Some(logger) = self.logger {
            logger.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::pal::{FsOp, LocalFileSystem, RecordingFileSystem};
    use std::fs;

    struct Trees {
        _scratch: tempfile::TempDir,
        src: PathBuf,
        dest: PathBuf,
    }

    fn trees() -> Trees {
        let scratch = tempfile::tempdir().unwrap();
        let src = scratch.path().join("src");
        let dest = scratch.path().join("dest");
        fs::create_dir(&src).unwrap();
        fs::create_dir(&dest).unwrap();
        Trees {
            _scratch: scratch,
            src,
            dest,
        }
    }

    fn ctx_with(created: &[&PathBuf], modified: &[&PathBuf], deleted: &[&PathBuf]) -> CycleContext {
        let mut ctx = CycleContext::new(16, 4).unwrap();
        for p in created {
            ctx.created.append(p.as_path()).unwrap();
        }
        for p in modified {
            ctx.modified.append(p.as_path()).unwrap();
        }
        for p in deleted {
            ctx.deleted.append(p.as_path()).unwrap();
        }
        ctx
    }

    #[test]
    fn insert_creates_parents_before_children_regardless_of_discovery_order() {
        let t = trees();
        fs::create_dir_all(t.src.join("a/b")).unwrap();
        fs::write(t.src.join("a/b/c.txt"), b"deep").unwrap();

        // Children listed first on purpose.
        let c = t.src.join("a/b/c.txt");
        let b = t.src.join("a/b");
        let a = t.src.join("a");
        let mut ctx = ctx_with(&[&c, &b, &a], &[], &[]);

        let rec = RecordingFileSystem::default();
        let report = Reconciler::new(&rec, &t.src, &t.dest).reconcile(&mut ctx);

        assert!(report.ok());
        assert_eq!(report.insert.applied, 3);
        assert_eq!(fs::read(t.dest.join("a/b/c.txt")).unwrap(), b"deep");
        assert_eq!(
            rec.ops(),
            vec![
                FsOp::CreateDir(t.dest.join("a")),
                FsOp::CreateDir(t.dest.join("a/b")),
                FsOp::Copy {
                    from: c,
                    to: t.dest.join("a/b/c.txt")
                },
            ]
        );
    }

    #[test]
    fn update_rewrites_existing_destination() {
        let t = trees();
        fs::write(t.src.join("f.txt"), b"new body").unwrap();
        fs::write(t.dest.join("f.txt"), b"old body that was longer").unwrap();

        let f = t.src.join("f.txt");
        let mut ctx = ctx_with(&[], &[&f], &[]);
        let fs_ops = LocalFileSystem::default();
        let report = Reconciler::new(&fs_ops, &t.src, &t.dest).reconcile(&mut ctx);

        assert!(report.ok());
        assert_eq!(report.update.applied, 1);
        assert_eq!(fs::read(t.dest.join("f.txt")).unwrap(), b"new body");
    }

    #[test]
    fn update_of_missing_destination_is_an_item_failure() {
        let t = trees();
        fs::write(t.src.join("f.txt"), b"x").unwrap();
        fs::write(t.src.join("g.txt"), b"y").unwrap();
        fs::write(t.dest.join("g.txt"), b"old").unwrap();

        let f = t.src.join("f.txt");
        let g = t.src.join("g.txt");
        let mut ctx = ctx_with(&[], &[&f, &g], &[]);
        let fs_ops = LocalFileSystem::default();
        let report = Reconciler::new(&fs_ops, &t.src, &t.dest).reconcile(&mut ctx);

        assert!(!report.ok());
        assert_eq!(report.update.failed, 1);
        assert_eq!(report.update.applied, 1);
        assert_eq!(report.errors[0].phase, SyncPhase::Update);
        assert_eq!(report.errors[0].path, f);
        assert!(!t.dest.join("f.txt").exists());
        assert_eq!(fs::read(t.dest.join("g.txt")).unwrap(), b"y");
    }

    #[test]
    fn delete_removes_children_before_parents() {
        let t = trees();
        fs::create_dir_all(t.dest.join("a/b")).unwrap();
        fs::write(t.dest.join("a/b/c.txt"), b"x").unwrap();
        fs::write(t.dest.join("a/f.txt"), b"x").unwrap();

        let a = t.src.join("a");
        let b = t.src.join("a/b");
        let c = t.src.join("a/b/c.txt");
        let f = t.src.join("a/f.txt");
        // Parent-first discovery order would fail on non-empty directories.
        let mut ctx = ctx_with(&[], &[], &[&a, &b, &f, &c]);

        let rec = RecordingFileSystem::default();
        let report = Reconciler::new(&rec, &t.src, &t.dest).reconcile(&mut ctx);

        assert!(report.ok(), "{:?}", report.errors);
        assert_eq!(report.delete.applied, 4);
        assert!(!t.dest.join("a").exists());
        let ops = rec.ops();
        assert_eq!(ops.first(), Some(&FsOp::Remove(t.dest.join("a/b/c.txt"))));
        assert_eq!(ops.last(), Some(&FsOp::Remove(t.dest.join("a"))));
    }

    #[test]
    fn delete_of_already_absent_destination_is_skipped() {
        let t = trees();
        let gone = t.src.join("never_mirrored.txt");
        let mut ctx = ctx_with(&[], &[], &[&gone]);

        let fs_ops = LocalFileSystem::default();
        let report = Reconciler::new(&fs_ops, &t.src, &t.dest).reconcile(&mut ctx);
        assert!(report.ok());
        assert_eq!(report.delete.skipped, 1);
    }

    #[test]
    fn source_root_deletion_never_removes_mirror_root() {
        let t = trees();
        let src_root = t.src.clone();
        let mut ctx = ctx_with(&[], &[], &[&src_root]);

        let fs_ops = LocalFileSystem::default();
        let report = Reconciler::new(&fs_ops, &t.src, &t.dest).reconcile(&mut ctx);
        assert_eq!(report.delete.skipped, 1);
        assert!(t.dest.exists());
    }

    #[test]
    fn failed_item_does_not_stop_later_phases() {
        let t = trees();
        fs::write(t.src.join("new.txt"), b"n").unwrap();
        fs::write(t.src.join("blocked.txt"), b"b").unwrap();
        fs::write(t.src.join("mod.txt"), b"m2").unwrap();
        fs::write(t.dest.join("mod.txt"), b"m1").unwrap();
        fs::write(t.dest.join("old.txt"), b"o").unwrap();

        let new = t.src.join("new.txt");
        let blocked = t.src.join("blocked.txt");
        let modified = t.src.join("mod.txt");
        let old = t.src.join("old.txt");
        let mut ctx = ctx_with(&[&blocked, &new], &[&modified], &[&old]);

        let rec = RecordingFileSystem::default();
        rec.fail_on(t.dest.join("blocked.txt"));
        let report = Reconciler::new(&rec, &t.src, &t.dest).reconcile(&mut ctx);

        assert!(!report.insert.ok());
        assert!(report.update.ok());
        assert!(report.delete.ok());
        assert_eq!(report.failures(), 1);
        assert!(t.dest.join("new.txt").exists());
        assert_eq!(fs::read(t.dest.join("mod.txt")).unwrap(), b"m2");
        assert!(!t.dest.join("old.txt").exists());
    }

    #[test]
    fn vanished_created_entry_is_an_insert_failure() {
        let t = trees();
        let ghost = t.src.join("ghost.txt");
        let mut ctx = ctx_with(&[&ghost], &[], &[]);

        let fs_ops = LocalFileSystem::default();
        let report = Reconciler::new(&fs_ops, &t.src, &t.dest).reconcile(&mut ctx);
        assert_eq!(report.insert.failed, 1);
        assert_eq!(report.errors[0].error_code, "SNT-2001");
    }

    #[test]
    fn existing_destination_directory_counts_as_in_place() {
        let t = trees();
        fs::create_dir(t.src.join("d")).unwrap();
        fs::create_dir(t.dest.join("d")).unwrap();

        let d = t.src.join("d");
        let mut ctx = ctx_with(&[&d], &[], &[]);
        let fs_ops = LocalFileSystem::default();
        let report = Reconciler::new(&fs_ops, &t.src, &t.dest).reconcile(&mut ctx);

        assert!(report.ok());
        assert_eq!(report.insert.skipped, 1);
    }

    #[test]
    fn path_outside_source_root_is_rejected() {
        let t = trees();
        let stray = PathBuf::from("/elsewhere/file.txt");
        let mut ctx = ctx_with(&[], &[&stray], &[]);

        let fs_ops = LocalFileSystem::default();
        let report = Reconciler::new(&fs_ops, &t.src, &t.dest).reconcile(&mut ctx);
        assert_eq!(report.update.failed, 1);
        assert_eq!(report.errors[0].error_code, "SNT-3900");
    }

    #[test]
    fn events_reach_the_activity_log() {
        let t = trees();
        fs::write(t.src.join("n.txt"), b"12345").unwrap();
        let log_dir = tempfile::tempdir().unwrap();
        let log_path = log_dir.path().join("a.jsonl");
        let (handle, join) = crate::logger::activity::spawn_logger(
            crate::logger::activity::ActivityLoggerConfig::for_path(&log_path),
        )
        .unwrap();

        let n = t.src.join("n.txt");
        let mut ctx = ctx_with(&[&n], &[], &[]);
        let fs_ops = LocalFileSystem::default();
        Reconciler::new(&fs_ops, &t.src, &t.dest)
            .with_logger(Some(&handle))
            .reconcile(&mut ctx);
        handle.shutdown();
        join.join().unwrap();

        let log = fs::read_to_string(&log_path).unwrap();
        assert!(log.contains("\"entry_created\""));
        assert!(log.contains("\"size\":5"));
    }
}
