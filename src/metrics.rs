//! Cycle counters for monitoring the fusion core.
//!
//! Owned by the engine instance rather than a process-wide registry so two
//! engines (or two tests) never share counts.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct FusionMetrics {
    cycles: AtomicU64,
    windows_emitted: AtomicU64,
    degraded_cycles: AtomicU64,
    conflicts_detected: AtomicU64,
    conflicts_resolved: AtomicU64,
}

impl FusionMetrics {
    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_windows(&self, emitted: usize) {
        self.windows_emitted
            .fetch_add(emitted as u64, Ordering::Relaxed);
    }

    pub fn record_degraded_cycle(&self) {
        self.degraded_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflicts(&self, detected: usize, resolved: usize) {
        self.conflicts_detected
            .fetch_add(detected as u64, Ordering::Relaxed);
        self.conflicts_resolved
            .fetch_add(resolved as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            windows_emitted: self.windows_emitted.load(Ordering::Relaxed),
            degraded_cycles: self.degraded_cycles.load(Ordering::Relaxed),
            conflicts_detected: self.conflicts_detected.load(Ordering::Relaxed),
            conflicts_resolved: self.conflicts_resolved.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub cycles: u64,
    pub windows_emitted: u64,
    pub degraded_cycles: u64,
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
}
