//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use mirror_sentinel::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, SentinelError};

// Platform
pub use crate::platform::pal::{FileKind, FileSystem, FsMetadata, LocalFileSystem};

// Scanner
pub use crate::scanner::changes::{ChangeList, SortDirection};
pub use crate::scanner::context::CycleContext;
pub use crate::scanner::index::{FileRecord, PathIndex};
pub use crate::scanner::walker::TreeWalker;

// Mirror
pub use crate::mirror::bootstrap::migrate;
pub use crate::mirror::reconcile::{ReconcileReport, Reconciler};

// Daemon
#[cfg(feature = "daemon")]
pub use crate::daemon::loop_main::{MirrorArgs, MirrorDaemon};

// Logger
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
