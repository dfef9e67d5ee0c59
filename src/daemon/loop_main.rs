//! Main mirror loop: bootstrap once, then poll forever.
//!
//! One logical task owns all engine state. Each cycle runs
//! sweep → detect → pause → reconcile → reset. The pause is the only suspension
//! point and the only place a cycle waits; it is sliced so a shutdown request is
//! noticed within `daemon.shutdown_check_ms`.
//!
//! A failed cycle is logged and the loop carries on. Only a bootstrap failure,
//! a capacity failure or a shutdown signal ends the process.
//!
//! The activity logger runs on its own thread and only ever receives owned
//! events; it never sees the index or the change lists.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::config::Config;
use crate::core::errors::{ErrorClass, Phase, Result, SentinelError};
use crate::core::paths::resolve_absolute_path;
use crate::daemon::signals::{ShutdownCoordinator, SignalHandler};
use crate::logger::activity::{ActivityEvent, ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger};
use crate::logger::jsonl::ChangeCounts;
use crate::mirror::bootstrap::migrate;
use crate::mirror::reconcile::{ReconcileReport, Reconciler};
use crate::platform::pal::{FileKind, FileSystem, LocalFileSystem};
use crate::scanner::context::CycleContext;
use crate::scanner::walker::TreeWalker;

// ──────────────────── daemon configuration ────────────────────

/// The two positional roots.
#[derive(Debug, Clone)]
pub struct MirrorArgs {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Lifecycle stage of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Bootstrapping,
    SteadyState,
    Stopped,
}

/// What one cycle saw and did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub counts: ChangeCounts,
    /// The sweep or walk was cut short; lists hold what was found before the failure.
    pub walk_failed: bool,
    /// Shutdown arrived during the pause; reconciliation did not run.
    pub interrupted: bool,
    pub reconcile: Option<ReconcileReport>,
    pub duration: Duration,
}

impl CycleReport {
    pub fn ok(&self) -> bool {
        !self.walk_failed && self.reconcile.as_ref().is_none_or(ReconcileReport::ok)
    }

    pub fn failures(&self) -> usize {
        usize::from(self.walk_failed) + self.reconcile.as_ref().map_or(0, ReconcileReport::failures)
    }
}

// ──────────────────── main daemon struct ────────────────────

/// The mirror daemon: owns the engine state for the life of the process.
pub struct MirrorDaemon {
    config: Config,
    fs: Arc<dyn FileSystem>,
    src_root: PathBuf,
    dest_root: PathBuf,
    ctx: Option<CycleContext>,
    state: DaemonState,
    signal_handler: SignalHandler,
    logger_handle: ActivityLoggerHandle,
    logger_join: Option<thread::JoinHandle<()>>,
    start_time: Instant,
    cycles: u64,
}

impl MirrorDaemon {
    /// Build the daemon against the local filesystem with OS signal hooks.
    pub fn init(config: Config, args: &MirrorArgs) -> Result<Self> {
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new(config.copy.chunk_size_bytes));
        Self::with_parts(config, args, fs, SignalHandler::new())
    }

    /// Build the daemon from explicit collaborators.
    ///
    /// Validates both roots before anything is allocated: the source must be an
    /// existing directory, and the destination must not live inside it.
    pub fn with_parts(
        config: Config,
        args: &MirrorArgs,
        fs: Arc<dyn FileSystem>,
        signal_handler: SignalHandler,
    ) -> Result<Self> {
        config.validate()?;
        let (src_root, dest_root) = preflight(fs.as_ref(), args)?;

        let ctx = CycleContext::from_config(&config)?;
        let (logger_handle, logger_join) =
            spawn_logger(ActivityLoggerConfig::for_path(&config.paths.activity_log))?;

        Ok(Self {
            config,
            fs,
            src_root,
            dest_root,
            ctx: Some(ctx),
            state: DaemonState::Bootstrapping,
            signal_handler,
            logger_handle,
            logger_join: Some(logger_join),
            start_time: Instant::now(),
            cycles: 0,
        })
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    pub fn source_root(&self) -> &Path {
        &self.src_root
    }

    pub fn destination_root(&self) -> &Path {
        &self.dest_root
    }

    /// Engine state, `None` once shut down.
    pub fn context(&self) -> Option<&CycleContext> {
        self.ctx.as_ref()
    }

    pub fn signal_handler(&self) -> &SignalHandler {
        &self.signal_handler
    }

    /// Completed cycles so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Bootstrap, then cycle until shutdown is requested.
    ///
    /// Returns the bootstrap error if startup fails; otherwise `Ok` after an
    /// orderly shutdown.
    pub fn run(&mut self) -> Result<()> {
        let config_hash = self.config.stable_hash().unwrap_or_default();
        self.logger_handle.send(ActivityEvent::DaemonStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash,
            source: self.src_root.clone(),
            destination: self.dest_root.clone(),
        });

        if let Err(e) = self.bootstrap() {
            eprintln!("[SNT-BOOT] bootstrap failed: {e}");
            self.log_error(&e);
            self.shutdown("bootstrap failure");
            return Err(e);
        }
        if self.state != DaemonState::SteadyState {
            eprintln!("[SNT-DAEMON] shutdown requested during bootstrap");
            self.shutdown("signal");
            return Ok(());
        }

        loop {
            if self.signal_handler.should_shutdown() {
                eprintln!("[SNT-DAEMON] shutdown requested");
                break;
            }

            match self.run_cycle() {
                Ok(report) if !report.ok() => {
                    eprintln!(
                        "[SNT-DAEMON] cycle {} failed ({} failures)",
                        self.cycles,
                        report.failures()
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("[SNT-DAEMON] fatal: {e}");
                    self.log_error(&e);
                    self.shutdown("fatal error");
                    return Err(e);
                }
            }
        }

        self.shutdown("signal");
        Ok(())
    }

    /// Index the source tree and bring the destination up to date with it.
    ///
    /// Any failure here is fatal. A shutdown request seen once the index is
    /// built skips migration and leaves the daemon in `Bootstrapping`.
    pub fn bootstrap(&mut self) -> Result<()> {
        let started = Instant::now();
        self.state = DaemonState::Bootstrapping;
        let ctx = self.ctx.as_mut().ok_or_else(stopped_error)?;
        let walker = TreeWalker::new(self.fs.as_ref());

        progress("Building index...");
        let indexed = match walker.build_index(&mut ctx.index, &self.src_root) {
            Ok(stats) => stats.visited,
            Err(e) => {
                println!("Failed.");
                return Err(e);
            }
        };
        println!("OK.");
        let longest_chain = ctx.index.longest_chain();

        if self.signal_handler.should_shutdown() {
            eprintln!("[SNT-BOOT] shutdown requested, skipping migration");
            return Ok(());
        }

        progress("Migrating files...");
        let migrated = match migrate(
            self.fs.as_ref(),
            &self.src_root,
            &self.dest_root,
            self.config.copy.preserve_permissions,
        ) {
            Ok(report) => report,
            Err(e) => {
                println!("Failed.");
                return Err(e);
            }
        };
        println!("OK.");

        self.logger_handle.send(ActivityEvent::BootstrapCompleted {
            indexed,
            longest_chain,
            dirs_created: migrated.dirs_created,
            files_copied: migrated.files_copied,
            duration_ms: millis(started.elapsed()),
        });
        self.state = DaemonState::SteadyState;
        Ok(())
    }

    /// One sweep → detect → pause → reconcile → reset pass.
    ///
    /// Walk failures are reported in the returned `CycleReport`; only errors
    /// that would make every later cycle fail too are returned as `Err`.
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        let started = Instant::now();
        let mut report = CycleReport::default();
        let ctx = self.ctx.as_mut().ok_or_else(stopped_error)?;
        let walker = TreeWalker::new(self.fs.as_ref());

        let walked = walker
            .sweep_stale(ctx)
            .and_then(|_| walker.detect_changes(ctx, &self.src_root));
        if let Err(e) = walked {
            if e.class_in(Phase::Detect) == ErrorClass::Fatal {
                return Err(e);
            }
            let retry = if e.is_retryable() { ", retrying next cycle" } else { "" };
            eprintln!("[SNT-WALK] walk aborted{retry}: {e}");
            self.logger_handle.send(ActivityEvent::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            });
            report.walk_failed = true;
        }

        let (created, modified, deleted) = ctx.counts();
        report.counts = ChangeCounts {
            created,
            modified,
            deleted,
        };

        if self.signal_handler.pause(
            self.config.daemon.poll_interval(),
            self.config.daemon.shutdown_check(),
        ) {
            report.interrupted = true;
            report.duration = started.elapsed();
            return Ok(report);
        }

        let reconciled = Reconciler::new(self.fs.as_ref(), &self.src_root, &self.dest_root)
            .preserve_permissions(self.config.copy.preserve_permissions)
            .with_logger(Some(&self.logger_handle))
            .reconcile(ctx);
        let quiet = ctx.is_quiet();
        ctx.reset();
        report.reconcile = Some(reconciled);
        report.duration = started.elapsed();

        self.cycles += 1;
        if !quiet || !report.ok() {
            self.logger_handle.send(ActivityEvent::CycleCompleted {
                counts: report.counts,
                failures: report.failures(),
                duration_ms: millis(report.duration),
                ok: report.ok(),
            });
        }
        Ok(report)
    }

    /// Release engine state and stop the logger. Idempotent.
    pub fn shutdown(&mut self, reason: &str) {
        if self.state == DaemonState::Stopped {
            return;
        }
        println!("Stopping...");
        let uptime_secs = self.start_time.elapsed().as_secs();
        let cycles = self.cycles;

        let mut release_state = || {
            self.ctx.take();
            true
        };
        let mut stop_logger = || {
            self.logger_handle.send(ActivityEvent::DaemonStopped {
                reason: reason.to_string(),
                uptime_secs,
                cycles,
            });
            self.logger_handle.shutdown();
            self.logger_join.take().is_none_or(|join| join.join().is_ok())
        };
        let mut steps: [(&str, &mut dyn FnMut() -> bool); 2] = [
            ("release index and change lists", &mut release_state),
            ("flush activity log", &mut stop_logger),
        ];
        let clean = ShutdownCoordinator::new().execute(&mut steps);

        self.state = DaemonState::Stopped;
        println!("{}", if clean { "OK" } else { "Failed." });
        eprintln!("[SNT-DAEMON] shutdown complete (uptime={uptime_secs}s, cycles={cycles})");
    }

    fn log_error(&self, e: &SentinelError) {
        self.logger_handle.send(ActivityEvent::Error {
            code: e.code().to_string(),
            message: e.to_string(),
        });
    }
}

// ──────────────────── helpers ────────────────────

/// Resolve both roots to absolute paths and check they can be mirrored.
fn preflight(fs: &dyn FileSystem, args: &MirrorArgs) -> Result<(PathBuf, PathBuf)> {
    let src = resolve_absolute_path(&args.source);
    let dest = resolve_absolute_path(&args.destination);

    let meta = fs.stat_metadata(&src).map_err(|e| SentinelError::InvalidRoot {
        path: src.clone(),
        details: format!("source is not accessible: {e}"),
    })?;
    if meta.kind != FileKind::Directory {
        return Err(SentinelError::InvalidRoot {
            path: src,
            details: "source is not a directory".to_string(),
        });
    }
    if dest.starts_with(&src) {
        return Err(SentinelError::InvalidRoot {
            path: dest,
            details: format!("destination is inside the source tree {}", src.display()),
        });
    }
    Ok((src, dest))
}

fn progress(label: &str) {
    print!("{label}");
    let _ = io::stdout().flush();
}

fn stopped_error() -> SentinelError {
    SentinelError::Runtime {
        details: "daemon has already shut down".to_string(),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

// ──────────────────── tests ────────────────────
