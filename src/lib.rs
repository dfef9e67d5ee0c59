#![forbid(unsafe_code)]

//! Mirror Sentinel: a polling daemon that keeps a destination directory tree
//! in step with a source tree.
//!
//! Startup indexes the source and copies over whatever the destination lacks.
//! After that, every cycle:
//! 1. **Sweep** drops index entries whose paths are gone (→ deleted)
//! 2. **Detect** walks the source, classifying new and changed paths
//! 3. **Pause** waits out the poll interval
//! 4. **Reconcile** applies insert, update and delete to the destination
//!
//! # Library usage
//!
//! ```rust,no_run
//! use mirror_sentinel::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use mirror_sentinel::core::config::Config;
//! use mirror_sentinel::scanner::walker::TreeWalker;
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod logger;
pub mod mirror;
pub mod platform;
pub mod scanner;
