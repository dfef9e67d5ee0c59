//! SNT-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, SentinelError>;

/// Top-level error type for the mirror sentinel.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("[SNT-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SNT-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SNT-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SNT-2001] cannot stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SNT-2002] path is not indexed: {path}")]
    NotIndexed { path: PathBuf },

    #[error("[SNT-2003] invalid mirror root {path}: {details}")]
    InvalidRoot { path: PathBuf, details: String },

    #[error("[SNT-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SNT-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SNT-3003] copy failure {from} -> {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SNT-3004] capacity failure for {what}: requested {requested}")]
    Capacity { what: &'static str, requested: usize },

    #[error("[SNT-3900] runtime failure: {details}")]
    Runtime { details: String },
}

/// Which stage of the mirror an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Bootstrap,
    Detect,
    Reconcile,
}

/// How far a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Aborts startup; the process exits with failure status.
    Fatal,
    /// Aborts the rest of the current cycle's walk.
    Subtree,
    /// Affects one path only; the phase continues.
    Item,
}

impl SentinelError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SNT-1001",
            Self::MissingConfig { .. } => "SNT-1002",
            Self::ConfigParse { .. } => "SNT-1003",
            Self::Stat { .. } => "SNT-2001",
            Self::NotIndexed { .. } => "SNT-2002",
            Self::InvalidRoot { .. } => "SNT-2003",
            Self::Serialization { .. } => "SNT-2101",
            Self::Io { .. } => "SNT-3002",
            Self::Copy { .. } => "SNT-3003",
            Self::Capacity { .. } => "SNT-3004",
            Self::Runtime { .. } => "SNT-3900",
        }
    }

    /// Whether retrying on a later cycle might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Stat { .. } | Self::Io { .. } | Self::Copy { .. } | Self::Runtime { .. }
        )
    }

    /// Classify this error for the phase it was raised in.
    ///
    /// Configuration and capacity failures are always fatal; everything else
    /// takes the scope of the phase.
    #[must_use]
    pub const fn class_in(&self, phase: Phase) -> ErrorClass {
        match self {
            Self::InvalidConfig { .. }
            | Self::MissingConfig { .. }
            | Self::ConfigParse { .. }
            | Self::InvalidRoot { .. }
            | Self::Capacity { .. } => ErrorClass::Fatal,
            _ => match phase {
                Phase::Bootstrap => ErrorClass::Fatal,
                Phase::Detect => ErrorClass::Subtree,
                Phase::Reconcile => ErrorClass::Item,
            },
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for stat/open failures.
    #[must_use]
    pub fn stat(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Stat {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for SentinelError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for SentinelError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
