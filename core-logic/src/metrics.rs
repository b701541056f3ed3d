use crate::traits::WorkerExit;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_secs: u64,
    pub swaps: SwapMetrics,
    pub workers: WorkerMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwapMetrics {
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub router_bans: u64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub max_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerMetrics {
    pub waves: u64,
    pub targets_met: u64,
    pub deadline_reached: u64,
    pub cancelled: u64,
    pub failed: u64,
}

#[derive(Debug)]
pub struct MetricsCollector {
    swaps_succeeded: AtomicU64,
    swaps_failed: AtomicU64,
    actions_skipped: AtomicU64,
    router_bans: AtomicU64,
    swap_duration_sum_ms: AtomicU64,
    swap_max_duration_ms: AtomicU64,
    waves: AtomicU64,
    exits_targets_met: AtomicU64,
    exits_deadline: AtomicU64,
    exits_cancelled: AtomicU64,
    exits_failed: AtomicU64,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            swaps_succeeded: AtomicU64::new(0),
            swaps_failed: AtomicU64::new(0),
            actions_skipped: AtomicU64::new(0),
            router_bans: AtomicU64::new(0),
            swap_duration_sum_ms: AtomicU64::new(0),
            swap_max_duration_ms: AtomicU64::new(0),
            waves: AtomicU64::new(0),
            exits_targets_met: AtomicU64::new(0),
            exits_deadline: AtomicU64::new(0),
            exits_cancelled: AtomicU64::new(0),
            exits_failed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl MetricsCollector {
    pub fn global() -> &'static Self {
        static INSTANCE: std::sync::OnceLock<MetricsCollector> = std::sync::OnceLock::new();
        INSTANCE.get_or_init(MetricsCollector::default)
    }

    pub fn record_swap(&self, duration: Duration, success: bool) {
        if success {
            let ms = duration.as_millis() as u64;
            self.swaps_succeeded.fetch_add(1, Ordering::SeqCst);
            self.swap_duration_sum_ms.fetch_add(ms, Ordering::SeqCst);
            self.swap_max_duration_ms.fetch_max(ms, Ordering::SeqCst);
        } else {
            self.swaps_failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn record_skip(&self) {
        self.actions_skipped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_ban(&self) {
        self.router_bans.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_wave(&self) {
        self.waves.fetch_add(1, Ordering::SeqCst);
    }

    /// `None` means the worker errored or panicked.
    pub fn record_worker_exit(&self, exit: Option<WorkerExit>) {
        let counter = match exit {
            Some(WorkerExit::TargetsMet) => &self.exits_targets_met,
            Some(WorkerExit::DeadlineReached) => &self.exits_deadline,
            Some(WorkerExit::Cancelled) => &self.exits_cancelled,
            None => &self.exits_failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let succeeded = self.swaps_succeeded.load(Ordering::SeqCst);
        let failed = self.swaps_failed.load(Ordering::SeqCst);
        let attempted = succeeded + failed;
        let duration_sum = self.swap_duration_sum_ms.load(Ordering::SeqCst);

        MetricsSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            swaps: SwapMetrics {
                succeeded,
                failed,
                skipped: self.actions_skipped.load(Ordering::SeqCst),
                router_bans: self.router_bans.load(Ordering::SeqCst),
                success_rate: if attempted > 0 {
                    succeeded as f64 / attempted as f64 * 100.0
                } else {
                    0.0
                },
                avg_duration_ms: if succeeded > 0 {
                    duration_sum as f64 / succeeded as f64
                } else {
                    0.0
                },
                max_duration_ms: self.swap_max_duration_ms.load(Ordering::SeqCst),
            },
            workers: WorkerMetrics {
                waves: self.waves.load(Ordering::SeqCst),
                targets_met: self.exits_targets_met.load(Ordering::SeqCst),
                deadline_reached: self.exits_deadline.load(Ordering::SeqCst),
                cancelled: self.exits_cancelled.load(Ordering::SeqCst),
                failed: self.exits_failed.load(Ordering::SeqCst),
            },
        }
    }

    pub async fn export_to_file(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}
