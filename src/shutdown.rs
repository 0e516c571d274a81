// SPDX-License-Identifier: GPL-3.0-only

//! Process-wide shutdown coordination
//!
//! A single boolean event shared by every long-lived thread. Signal
//! handlers set it; a second signal escalates to immediate exit. Each
//! worker polls the flag with a bounded wait so shutdown propagates
//! within roughly one second.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Cloneable handle to the process-wide stop event
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Check whether shutdown has been requested
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Request shutdown
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Sleep for `total`, waking early if the flag is set.
    ///
    /// Returns true if the flag was set before the wait elapsed.
    pub fn wait(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        let step = Duration::from_millis(50);
        while Instant::now() < deadline {
            if self.is_set() {
                return true;
            }
            std::thread::sleep(step.min(deadline.saturating_duration_since(Instant::now())));
        }
        self.is_set()
    }
}

/// Install interrupt/terminate handlers that set the flag.
///
/// The first signal requests cooperative shutdown; a second one exits
/// the process immediately.
pub fn install_signal_handler(flag: ShutdownFlag) -> Result<(), ctrlc::Error> {
    let already_signaled = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler(move || {
        if already_signaled.swap(true, Ordering::SeqCst) {
            warn!("Second shutdown signal, exiting immediately");
            std::process::exit(1);
        }
        info!("Shutdown signal received");
        flag.trigger();
    })
}

/// Join a worker thread within a time budget.
///
/// Threads that miss the budget are abandoned with a warning rather
/// than blocking teardown.
pub fn join_with_budget(handle: JoinHandle<()>, budget: Duration, name: &str) {
    let deadline = Instant::now() + budget;
    while Instant::now() < deadline {
        if handle.is_finished() {
            if handle.join().is_err() {
                warn!(thread = name, "Worker thread panicked");
            }
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    warn!(thread = name, budget_ms = budget.as_millis() as u64, "Worker thread missed join budget, abandoning");
}
