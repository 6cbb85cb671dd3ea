//! Process-memory watchdog.
//!
//! The search samples resident memory every few hundred node expansions and
//! whenever a dispatch returns. Crossing the configured ceiling raises a
//! process-wide abort flag that workers poll between expansions; the run
//! then winds down and reports a soft failure instead of taking the host
//! down with it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

/// Node expansions between probes.
pub const PROBE_INTERVAL_OPS: u64 = 500;

/// Resident set size of this process, if the host exposes it.
#[cfg(target_os = "linux")]
pub fn process_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb = rest.split_whitespace().next()?.parse::<u64>().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
pub fn process_memory_bytes() -> Option<u64> {
    None
}

#[derive(Debug)]
pub struct MemoryMonitor {
    threshold_bytes: u64,
    abort: Arc<AtomicBool>,
    ops_since_probe: u64,
}

impl MemoryMonitor {
    pub fn new(threshold_gb: f64) -> MemoryMonitor {
        MemoryMonitor::with_flag(threshold_gb, Arc::new(AtomicBool::new(false)))
    }

    /// A monitor that trips an existing flag. Workers each carry one of
    /// these so a ceiling crossed anywhere stops the whole run.
    pub fn with_flag(threshold_gb: f64, abort: Arc<AtomicBool>) -> MemoryMonitor {
        MemoryMonitor {
            threshold_bytes: (threshold_gb.max(0.0) * 1024.0 * 1024.0 * 1024.0) as u64,
            abort,
            ops_since_probe: 0,
        }
    }

    /// The flag workers poll between node expansions.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Record `n` expansions; probes once per interval. Returns the abort
    /// state so loops can bail in one expression.
    pub fn record_ops(&mut self, n: u64) -> bool {
        self.ops_since_probe += n;
        if self.ops_since_probe >= PROBE_INTERVAL_OPS {
            self.ops_since_probe = 0;
            return self.probe_now();
        }
        self.aborted()
    }

    /// Sample memory immediately (dispatch returns probe through here).
    pub fn probe_now(&mut self) -> bool {
        if self.aborted() {
            return true;
        }
        if let Some(bytes) = process_memory_bytes() {
            if bytes >= self.threshold_bytes {
                warn!(
                    used_bytes = bytes,
                    threshold_bytes = self.threshold_bytes,
                    "memory ceiling reached, aborting run"
                );
                self.abort.store(true, Ordering::Relaxed);
                return true;
            }
        }
        false
    }
}
