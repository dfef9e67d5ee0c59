//! Signal handling: SIGTERM/SIGINT request a graceful shutdown.
//!
//! Uses the `signal-hook` crate for safe signal registration. The handler only
//! flips an atomic flag; the main loop polls it at the top of every cycle and
//! while pausing, then tears down on its own thread.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use signal_hook::consts::{SIGINT, SIGTERM};

// ──────────────────── signal handler ────────────────────

/// Cancellation flag shared between the signal handler and the main loop.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a new handler and register SIGTERM/SIGINT hooks.
    ///
    /// Registration is best-effort; failures are logged to stderr but not fatal.
    pub fn new() -> Self {
        let handler = Self::detached();
        handler.register_signals();
        handler
    }

    /// A handler with no OS hooks attached. Shutdown can only be requested
    /// programmatically.
    pub fn detached() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Programmatically request shutdown (e.g. after a fatal bootstrap error).
    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    /// Sleep for `total`, waking every `slice` to check the flag.
    ///
    /// Returns `true` if shutdown was requested before the full pause elapsed.
    pub fn pause(&self, total: Duration, slice: Duration) -> bool {
        let slice = slice.max(Duration::from_millis(1));
        let deadline = Instant::now() + total;
        loop {
            if self.should_shutdown() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(slice.min(deadline - now));
        }
    }

    fn register_signals(&self) {
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[SNT-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[SNT-SIGNAL] failed to register SIGINT: {e}");
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────── shutdown coordinator ────────────────────

/// Runs named teardown steps in order, reporting each to stderr.
pub struct ShutdownCoordinator {
    /// Steps not started before this much time has passed are abandoned.
    pub timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a coordinator with the default 10-second timeout.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }

    /// Execute the shutdown sequence. Returns `true` if every step reported
    /// success within the timeout.
    pub fn execute(&self, steps: &mut [(&str, &mut dyn FnMut() -> bool)]) -> bool {
        let start = Instant::now();
        let mut all_ok = true;

        for (name, step) in steps.iter_mut() {
            if start.elapsed() > self.timeout {
                eprintln!("[SNT-SHUTDOWN] timeout reached, abandoning remaining steps");
                return false;
            }

            if step() {
                eprintln!("[SNT-SHUTDOWN] {name}: ok");
            } else {
                eprintln!("[SNT-SHUTDOWN] {name}: failed");
                all_ok = false;
            }
        }

        all_ok
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────── tests ────────────────────
