use metrics_util::AtomicBucket;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// One observed operation latency, stamped with the time the operation completed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LatencySample {
    pub at: Instant,
    pub latency: Duration,
}

/// Counters of a single worker.
///
/// Written only by the owning worker. The metrics sampler drains the latency bucket while the run
/// is live and the orchestrator reads the counters once the worker has finished.
pub struct WorkerStats {
    issued: AtomicU64,
    failed: AtomicU64,
    latency: Option<AtomicBucket<LatencySample>>,
}

impl WorkerStats {
    pub fn new(collect_latency: bool) -> Self {
        Self {
            issued: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            latency: collect_latency.then(AtomicBucket::new),
        }
    }

    pub fn record_success(&self, latency: Duration) {
        self.issued.fetch_add(1, Ordering::Relaxed);
        self.push_latency(latency);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.issued.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.push_latency(latency);
    }

    fn push_latency(&self, latency: Duration) {
        if let Some(bucket) = &self.latency {
            bucket.push(LatencySample {
                at: Instant::now(),
                latency,
            });
        }
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn collects_latency(&self) -> bool {
        self.latency.is_some()
    }

    /// Hand every latency observed since the previous drain to `f`, then forget them.
    pub fn drain_latencies<F>(&self, mut f: F)
    where
        F: FnMut(&[LatencySample]),
    {
        if let Some(bucket) = &self.latency {
            bucket.clear_with(|block| f(block));
        }
    }
}

impl fmt::Debug for WorkerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerStats")
            .field("issued", &self.issued())
            .field("failed", &self.failed())
            .field("collect_latency", &self.collects_latency())
            .finish()
    }
}
