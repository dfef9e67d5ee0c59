//! Shared path manipulation utilities. Pure string work, no I/O except
//! [`resolve_absolute_path`].

use std::env;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::core::errors::{Result, SentinelError};

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks
/// and normalize components.
///
/// If it fails (e.g. path does not exist), the path is made absolute relative
/// to CWD and `..`/`.` components are resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}

/// Join `child` onto `base`. An empty `child` yields `base` unchanged.
pub fn join_path(base: &Path, child: impl AsRef<Path>) -> PathBuf {
    let child = child.as_ref();
    if child.as_os_str().is_empty() {
        return base.to_path_buf();
    }
    base.join(child)
}

/// Strip `root` from the front of `path`. `None` when `path` is not under `root`.
pub fn relative_path(path: &Path, root: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().map(Path::to_path_buf)
}

/// Final component of `path`, or the empty string for `/`.
pub fn basename(path: &Path) -> &OsStr {
    path.file_name().unwrap_or_default()
}

/// Whether a directory entry name is one of the synthetic `.`/`..` entries.
pub fn is_self_entry(name: &OsStr) -> bool {
    name == "." || name == ".."
}

/// Map a path under `src_root` onto the same relative location under `dest_root`.
pub fn mirror_path(path: &Path, src_root: &Path, dest_root: &Path) -> Result<PathBuf> {
    let relative = relative_path(path, src_root).ok_or_else(|| SentinelError::Runtime {
        details: format!(
            "{} is not under source root {}",
            path.display(),
            src_root.display()
        ),
    })?;
    Ok(join_path(dest_root, relative))
}

/// String length of a path, the ordering key for tree mutations.
pub fn path_len(path: &Path) -> usize {
    path.as_os_str().len()
}
