//! Activity logger: a dedicated thread owns the `JsonlWriter`.
//!
//! The daemon sends `ActivityEvent`s over a bounded crossbeam channel. Non-blocking
//! `try_send()` means a slow disk never stalls the polling loop; overflow is
//! counted and reported on the next line that does get written.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{Result, SentinelError};
use crate::logger::jsonl::{ChangeCounts, EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Default bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── public event type ────────────────────

/// Events recorded in the activity log.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    DaemonStarted {
        version: String,
        config_hash: String,
        source: PathBuf,
        destination: PathBuf,
    },
    DaemonStopped {
        reason: String,
        uptime_secs: u64,
        cycles: u64,
    },
    BootstrapCompleted {
        indexed: usize,
        /// Deepest bucket chain in the path index after the initial build.
        longest_chain: usize,
        dirs_created: usize,
        files_copied: usize,
        duration_ms: u64,
    },
    CycleCompleted {
        counts: ChangeCounts,
        failures: usize,
        duration_ms: u64,
        ok: bool,
    },
    EntryCreated {
        path: PathBuf,
        dest: PathBuf,
        /// `None` for directories.
        bytes: Option<u64>,
    },
    EntryUpdated {
        path: PathBuf,
        dest: PathBuf,
        bytes: u64,
    },
    EntryRemoved {
        path: PathBuf,
        dest: PathBuf,
    },
    SyncFailed {
        phase: &'static str,
        path: PathBuf,
        error_code: String,
        error_message: String,
    },
    Error {
        code: String,
        message: String,
    },
    /// Ask the logger thread to flush and exit.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Cheaply-cloneable handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Never blocks.
    ///
    /// If the channel is full the event is dropped and the dropped-events counter
    /// is incremented.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Events dropped due to channel back-pressure and not yet reported.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Blocks only until the request is queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

// ──────────────────── configuration ────────────────────

/// Options for the activity logger thread.
#[derive(Debug, Clone)]
pub struct ActivityLoggerConfig {
    pub jsonl_config: JsonlConfig,
    /// Bounded channel capacity.
    pub channel_capacity: usize,
}

impl ActivityLoggerConfig {
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            jsonl_config: JsonlConfig::for_path(path),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

impl Default for ActivityLoggerConfig {
    fn default() -> Self {
        Self {
            jsonl_config: JsonlConfig::default(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread and return a handle to it.
///
/// The thread runs until `handle.shutdown()` is called or every handle is dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("sentinel-logger".to_string())
        .spawn(move || {
            logger_thread_main(&rx, config.jsonl_config, &dropped_clone);
        })
        .map_err(|e| SentinelError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── logger thread ────────────────────

fn logger_thread_main(rx: &Receiver<ActivityEvent>, jsonl_config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }

        jsonl.write_entry(&event_to_log_entry(&event));
    }

    jsonl.flush();
    jsonl.fsync();
}

// ──────────────────── event conversion ────────────────────

fn display(path: &std::path::Path) -> Option<String> {
    Some(path.display().to_string())
}

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::DaemonStarted {
            version,
            config_hash,
            source,
            destination,
        } => {
            let mut e = LogEntry::new(EventType::DaemonStart, Severity::Info);
            e.path = display(source);
            e.dest = display(destination);
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::DaemonStopped {
            reason,
            uptime_secs,
            cycles,
        } => {
            let mut e = LogEntry::new(EventType::DaemonStop, Severity::Info);
            e.details = Some(format!("reason={reason} uptime={uptime_secs}s cycles={cycles}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::BootstrapCompleted {
            indexed,
            longest_chain,
            dirs_created,
            files_copied,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::BootstrapComplete, Severity::Info);
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!(
                "indexed={indexed} longest_chain={longest_chain} dirs_created={dirs_created} files_copied={files_copied}"
            ));
            e.ok = Some(true);
            e
        }
        ActivityEvent::CycleCompleted {
            counts,
            failures,
            duration_ms,
            ok,
        } => {
            let severity = if *ok { Severity::Info } else { Severity::Warning };
            let mut e = LogEntry::new(EventType::CycleComplete, severity);
            e.counts = Some(*counts);
            e.duration_ms = Some(*duration_ms);
            if *failures > 0 {
                e.details = Some(format!("failures={failures}"));
            }
            e.ok = Some(*ok);
            e
        }
        ActivityEvent::EntryCreated { path, dest, bytes } => {
            let mut e = LogEntry::new(EventType::EntryCreated, Severity::Info);
            e.path = display(path);
            e.dest = display(dest);
            e.size = *bytes;
            e.ok = Some(true);
            e
        }
        ActivityEvent::EntryUpdated { path, dest, bytes } => {
            let mut e = LogEntry::new(EventType::EntryUpdated, Severity::Info);
            e.path = display(path);
            e.dest = display(dest);
            e.size = Some(*bytes);
            e.ok = Some(true);
            e
        }
        ActivityEvent::EntryRemoved { path, dest } => {
            let mut e = LogEntry::new(EventType::EntryRemoved, Severity::Info);
            e.path = display(path);
            e.dest = display(dest);
            e.ok = Some(true);
            e
        }
        ActivityEvent::SyncFailed {
            phase,
            path,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::SyncFailed, Severity::Warning);
            e.path = display(path);
            e.ok = Some(false);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e.details = Some(format!("phase={phase}"));
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => {
            // Handled in the thread loop.
            LogEntry::new(EventType::DaemonStop, Severity::Info)
        }
    }
}

// ──────────────────── tests ────────────────────
