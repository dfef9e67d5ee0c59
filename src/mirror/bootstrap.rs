//! One-shot initial mirror: materialize every source entry that is missing
//! from the destination.
//!
//! Migration is additive and non-destructive. Files already present at the
//! destination are left exactly as they are (even if their content differs),
//! and nothing at the destination is ever removed. Any failure aborts the
//! migration and is fatal for startup.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use crate::core::errors::Result;
use crate::core::paths::{is_self_entry, join_path};
use crate::platform::pal::{CopyMode, FileKind, FileSystem};

/// What a migration did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrateReport {
    pub dirs_created: usize,
    pub files_copied: usize,
    /// Files left alone because the destination already had them.
    pub files_skipped: usize,
    pub bytes_copied: u64,
}

/// Mirror `src_root` onto `dest_root`, creating whatever is missing.
///
/// Directories (the destination root included) are created with the source
/// permission bits when `preserve_permissions` is set; so are newly copied files.
pub fn migrate(
    fs: &dyn FileSystem,
    src_root: &Path,
    dest_root: &Path,
    preserve_permissions: bool,
) -> Result<MigrateReport> {
    let mut report = MigrateReport::default();
    let mut stack: Vec<(PathBuf, PathBuf)> = vec![(src_root.to_path_buf(), dest_root.to_path_buf())];

    while let Some((src, dest)) = stack.pop() {
        let meta = fs.stat_metadata(&src)?;
        let mode = preserve_permissions.then_some(meta.mode);

        match meta.kind {
            FileKind::Directory => {
                if !fs.exists(&dest) {
                    fs.create_dir(&dest, mode)?;
                    report.dirs_created += 1;
                }
                let names = fs.list_dir(&src)?;
                for name in names.iter().rev() {
                    if is_self_entry(name) {
                        continue;
                    }
                    stack.push((join_path(&src, name), join_path(&dest, name)));
                }
            }
            FileKind::File => {
                if fs.exists(&dest) {
                    report.files_skipped += 1;
                } else {
                    report.bytes_copied += fs.copy_file_content(&src, &dest, CopyMode::Create, mode)?;
                    report.files_copied += 1;
                }
            }
            FileKind::Other => {}
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::pal::{FsOp, LocalFileSystem, RecordingFileSystem};
    use std::fs;

    fn source_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/c.txt"), b"hello").unwrap();
        fs::write(dir.path().join("top.txt"), b"top").unwrap();
        dir
    }

    #[test]
    fn fresh_destination_receives_full_tree() {
        let src = source_tree();
        let scratch = tempfile::tempdir().unwrap();
        let dest = scratch.path().join("mirror");

        let report = migrate(&LocalFileSystem::default(), src.path(), &dest, true).unwrap();

        assert_eq!(fs::read(dest.join("a/b/c.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(dest.join("top.txt")).unwrap(), b"top");
        // mirror root, a, a/b
        assert_eq!(report.dirs_created, 3);
        assert_eq!(report.files_copied, 2);
        assert_eq!(report.bytes_copied, 8);
    }

    #[test]
    fn existing_destination_files_are_never_overwritten() {
        let src = source_tree();
        let dest = tempfile::tempdir().unwrap();
        fs::write(dest.path().join("top.txt"), b"locally edited").unwrap();
        fs::write(dest.path().join("extra.txt"), b"only here").unwrap();

        let report = migrate(&LocalFileSystem::default(), src.path(), dest.path(), true).unwrap();

        assert_eq!(fs::read(dest.path().join("top.txt")).unwrap(), b"locally edited");
        assert_eq!(fs::read(dest.path().join("extra.txt")).unwrap(), b"only here");
        assert_eq!(fs::read(dest.path().join("a/b/c.txt")).unwrap(), b"hello");
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.files_copied, 1);
    }

    #[test]
    fn second_migration_is_a_no_op() {
        let src = source_tree();
        let dest = tempfile::tempdir().unwrap();
        let rec = RecordingFileSystem::default();

        migrate(&rec, src.path(), dest.path(), true).unwrap();
        rec.clear_ops();
        let report = migrate(&rec, src.path(), dest.path(), true).unwrap();

        assert!(rec.ops().is_empty());
        assert_eq!(report.files_copied, 0);
        assert_eq!(report.dirs_created, 0);
    }

    #[test]
    fn parents_are_created_before_children() {
        let src = source_tree();
        let scratch = tempfile::tempdir().unwrap();
        let dest = scratch.path().join("m");
        let rec = RecordingFileSystem::default();

        migrate(&rec, src.path(), &dest, false).unwrap();

        let ops = rec.ops();
        let pos = |want: &FsOp| ops.iter().position(|op| op == want).unwrap();
        let root = pos(&FsOp::CreateDir(dest.clone()));
        let a = pos(&FsOp::CreateDir(dest.join("a")));
        let b = pos(&FsOp::CreateDir(dest.join("a/b")));
        let c = pos(&FsOp::Copy {
            from: src.path().join("a/b/c.txt"),
            to: dest.join("a/b/c.txt"),
        });
        assert!(root < a && a < b && b < c);
    }

    #[test]
    fn failure_aborts_migration() {
        let src = source_tree();
        let dest = tempfile::tempdir().unwrap();
        let rec = RecordingFileSystem::default();
        rec.fail_on(dest.path().join("a"));

        let err = migrate(&rec, src.path(), dest.path(), true).unwrap_err();
        assert_eq!(err.code(), "SNT-3002");
        assert!(!dest.path().join("a/b").exists());
    }

    #[test]
    fn missing_destination_parent_fails() {
        let src = source_tree();
        let scratch = tempfile::tempdir().unwrap();
        let dest = scratch.path().join("no/such/parent");
        assert!(migrate(&LocalFileSystem::default(), src.path(), &dest, true).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn permissions_are_carried_over() {
        use std::os::unix::fs::PermissionsExt;
        let src = tempfile::tempdir().unwrap();
        fs::create_dir(src.path().join("private")).unwrap();
        fs::set_permissions(src.path().join("private"), fs::Permissions::from_mode(0o750)).unwrap();
        fs::write(src.path().join("script.sh"), b"#!/bin/sh\n").unwrap();
        fs::set_permissions(src.path().join("script.sh"), fs::Permissions::from_mode(0o754)).unwrap();

        let dest = tempfile::tempdir().unwrap();
        migrate(&LocalFileSystem::default(), src.path(), dest.path(), true).unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&dest.path().join("private")), 0o750);
        // umask may clear group/other bits but never adds owner execute.
        assert_eq!(mode(&dest.path().join("script.sh")) & 0o700, 0o700);
    }
}
