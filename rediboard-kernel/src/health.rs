use crate::snapshot::SnapshotStore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassStats {
    pub finished_at: i64,
    pub duration_ms: u64,
    pub polled: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub instances_tracked: u32,
    pub instances_with_errors: u32,
    pub global_errors: u32,
    pub passes_completed: u64,
    pub last_pass: Option<PassStats>,
    pub memory_usage_mb: f32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    passes: Arc<AtomicU64>,
    last_pass: Arc<parking_lot::Mutex<Option<PassStats>>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            passes: Arc::new(AtomicU64::new(0)),
            last_pass: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    pub fn record_pass(&self, finished_at: i64, elapsed: Duration, polled: usize, skipped: usize, failed: usize) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        *self.last_pass.lock() = Some(PassStats {
            finished_at,
            duration_ms: elapsed.as_millis() as u64,
            polled,
            skipped,
            failed,
        });
    }

    pub fn get_health(&self, store: &SnapshotStore) -> KernelHealth {
        let snapshot = store.load();
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            instances_tracked: snapshot.instances.len() as u32,
            instances_with_errors: snapshot.instances.iter().filter(|i| !i.errors.is_empty()).count() as u32,
            global_errors: snapshot.errors.len() as u32,
            passes_completed: self.passes.load(Ordering::Relaxed),
            last_pass: *self.last_pass.lock(),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    if let Some(Ok(kb)) = rest.split_whitespace().next().map(str::parse::<u64>) {
                        return (kb as f32) / 1024.0; // KB -> MB
                    }
                }
            }
        }
    }

    // pas de /proc : inconnu
    0.0
}
