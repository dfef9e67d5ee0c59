//! Append-only activity log, one JSON object per line.
//!
//! A line is serialized in full before it is written, and written with a single
//! `write_all`, so anything tailing the file sees whole records only.
//!
//! When the log file cannot be written the writer steps down a level and keeps
//! going: primary file, then fallback file, then stderr (`[SNT-JSONL]` prefix),
//! then nothing at all. While degraded it periodically tries the primary again.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SentinelError};

const WRITE_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// What a log line records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DaemonStart,
    DaemonStop,
    BootstrapComplete,
    CycleComplete,
    EntryCreated,
    EntryUpdated,
    EntryRemoved,
    SyncFailed,
    Error,
}

/// One activity log record. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC, millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Source-side path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Destination-side path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    /// Bytes copied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<ChangeCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Sizes of the three change lists for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub created: usize,
    pub modified: usize,
    pub deleted: usize,
}

impl LogEntry {
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event,
            severity,
            path: None,
            dest: None,
            size: None,
            counts: None,
            duration_ms: None,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }

    /// Serialize to a single newline-terminated line.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self).map_err(|e| SentinelError::Serialization {
            context: "activity log entry",
            details: e.to_string(),
        })?;
        line.push('\n');
        Ok(line)
    }
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    /// Used when `path` cannot be opened or written.
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the active file would grow past this.
    pub max_size_bytes: u64,
    /// Rotated generations kept as `<path>.1` .. `<path>.N`.
    pub max_rotated_files: u32,
    pub fsync_interval_secs: u64,
    /// How often a degraded writer retries the primary path.
    pub recover_interval_secs: u64,
}

impl JsonlConfig {
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: crate::core::config::PathsConfig::default().activity_log,
            fallback_path: Some(std::env::temp_dir().join("sentinel-activity.jsonl")),
            max_size_bytes: 64 * 1024 * 1024,
            max_rotated_files: 5,
            fsync_interval_secs: 10,
            recover_interval_secs: 60,
        }
    }
}

/// Where lines currently go.
enum Sink {
    Primary(BufWriter<File>),
    Fallback(BufWriter<File>),
    Stderr,
    Discard,
}

impl Sink {
    const fn label(&self) -> &'static str {
        match self {
            Self::Primary(_) => "normal",
            Self::Fallback(_) => "fallback",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        }
    }

    fn file(&mut self) -> Option<&mut BufWriter<File>> {
        match self {
            Self::Primary(w) | Self::Fallback(w) => Some(w),
            Self::Stderr | Self::Discard => None,
        }
    }
}

pub struct JsonlWriter {
    config: JsonlConfig,
    sink: Sink,
    bytes_written: u64,
    last_fsync: Instant,
    last_recover_attempt: Instant,
}

impl JsonlWriter {
    /// Open the primary log, stepping down to whatever level works.
    pub fn open(config: JsonlConfig) -> Self {
        let now = Instant::now();
        let mut writer = Self {
            config,
            sink: Sink::Discard,
            bytes_written: 0,
            last_fsync: now,
            last_recover_attempt: now,
        };
        match open_append(&writer.config.path) {
            Ok((file, size)) => writer.use_file(file, size, true),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[SNT-JSONL] cannot open activity log: {e}");
                writer.open_fallback();
            }
        }
        writer
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        match entry.to_line() {
            Ok(line) => self.write_line(&line),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[SNT-JSONL] {e}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.sink.file() {
            let _ = w.flush();
        }
    }

    pub fn fsync(&mut self) {
        if let Some(w) = self.sink.file() {
            let _ = w.flush();
            let _ = w.get_ref().sync_data();
        }
        self.last_fsync = Instant::now();
    }

    /// `"normal"`, `"fallback"`, `"stderr"` or `"discard"`.
    pub fn state(&self) -> &'static str {
        self.sink.label()
    }

    /// Size of the active file.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Switch back to the primary path if it can be opened again.
    pub fn try_recover(&mut self) -> bool {
        self.last_recover_attempt = Instant::now();
        if matches!(self.sink, Sink::Primary(_)) {
            return true;
        }
        let Ok((file, size)) = open_append(&self.config.path) else {
            return false;
        };
        self.flush();
        self.use_file(file, size, true);
        let _ = writeln!(
            io::stderr(),
            "[SNT-JSONL] activity log restored: {}",
            self.config.path.display()
        );
        true
    }

    fn write_line(&mut self, line: &str) {
        if !matches!(self.sink, Sink::Primary(_))
            && self.last_recover_attempt.elapsed() >= Duration::from_secs(self.config.recover_interval_secs)
        {
            self.try_recover();
        }

        let len = line.len() as u64;
        if self.sink.file().is_some() && self.bytes_written + len > self.config.max_size_bytes {
            self.rotate();
        }

        loop {
            let written = match &mut self.sink {
                Sink::Primary(w) | Sink::Fallback(w) => w.write_all(line.as_bytes()).is_ok(),
                Sink::Stderr => {
                    let _ = write!(io::stderr(), "[SNT-JSONL] {line}");
                    return;
                }
                Sink::Discard => return,
            };
            if written {
                break;
            }
            self.step_down();
        }

        self.bytes_written += len;
        if self.last_fsync.elapsed() >= Duration::from_secs(self.config.fsync_interval_secs) {
            self.fsync();
        }
    }

    fn use_file(&mut self, file: File, size: u64, primary: bool) {
        let w = BufWriter::with_capacity(WRITE_BUFFER, file);
        self.sink = if primary { Sink::Primary(w) } else { Sink::Fallback(w) };
        self.bytes_written = size;
    }

    fn open_fallback(&mut self) {
        let opened = self
            .config
            .fallback_path
            .as_deref()
            .map(|fb| (fb, open_append(fb)));
        match opened {
            Some((fb, Ok((file, size)))) => {
                let _ = writeln!(io::stderr(), "[SNT-JSONL] using fallback log {}", fb.display());
                self.use_file(file, size, false);
            }
            _ => {
                let _ = writeln!(io::stderr(), "[SNT-JSONL] no writable log file, using stderr");
                self.sink = Sink::Stderr;
            }
        }
    }

    /// Move one level down the chain after a failed write.
    fn step_down(&mut self) {
        match std::mem::replace(&mut self.sink, Sink::Discard) {
            Sink::Primary(_) => self.open_fallback(),
            Sink::Fallback(_) => {
                let _ = writeln!(io::stderr(), "[SNT-JSONL] fallback log failed, using stderr");
                self.sink = Sink::Stderr;
            }
            Sink::Stderr | Sink::Discard => {}
        }
        self.bytes_written = 0;
    }

    fn active_path(&self) -> Option<PathBuf> {
        match self.sink {
            Sink::Primary(_) => Some(self.config.path.clone()),
            Sink::Fallback(_) => self.config.fallback_path.clone(),
            Sink::Stderr | Sink::Discard => None,
        }
    }

    fn rotate(&mut self) {
        let Some(base) = self.active_path() else {
            return;
        };
        let primary = matches!(self.sink, Sink::Primary(_));
        self.flush();
        self.sink = Sink::Discard;

        shift_generations(&base, self.config.max_rotated_files);

        match open_append(&base) {
            Ok((file, size)) => self.use_file(file, size, primary),
            Err(_) if primary => self.open_fallback(),
            Err(_) => self.sink = Sink::Stderr,
        }
    }
}

/// `log` → `log.1` → `log.2` …, dropping anything past `keep`.
fn shift_generations(base: &Path, keep: u32) {
    if keep == 0 {
        let _ = fs::remove_file(base);
        return;
    }
    let _ = fs::remove_file(generation(base, keep));
    for i in (1..keep).rev() {
        let _ = fs::rename(generation(base, i), generation(base, i + 1));
    }
    let _ = fs::rename(base, generation(base, 1));
}

fn generation(base: &Path, n: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Open `path` for appending, creating it and its parents. Returns the current size.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| SentinelError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SentinelError::io(path, source))?;
    let size = file.metadata().map_or(0, |m| m.len());
    Ok((file, size))
}
