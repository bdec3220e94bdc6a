use crate::periodic::PeriodicTask;
use crate::sink::MetricsSink;
use crate::stats::WorkerStats;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Counts of samples handled by a [`MetricsSampler`] over its lifetime.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SamplerSummary {
    /// Samples handed to the sink.
    pub forwarded: u64,
    /// Samples drained during warm-up and dropped.
    pub discarded: u64,
}

/// Periodically moves latency samples out of the workers into a sink.
///
/// Samples recorded before the warm-up has elapsed are dropped, whenever they are drained. Workers are never blocked by the
/// sampler; it only empties their lock-free buckets.
pub struct MetricsSampler {
    task: PeriodicTask,
    drain: Arc<Drain>,
    stopped: Option<SamplerSummary>,
}

struct Drain {
    stats: Vec<Arc<WorkerStats>>,
    sink: Arc<dyn MetricsSink>,
    /// `None` when there is no warm-up to cut.
    warmup_end: Option<Instant>,
    forwarded: AtomicU64,
    discarded: AtomicU64,
}

impl Drain {
    fn drain(&self) {
        for stats in &self.stats {
            stats.drain_latencies(|block| {
                let mut forwarded = 0;
                for sample in block {
                    if self.warmup_end.map_or(true, |end| sample.at >= end) {
                        self.sink.record(sample.latency);
                        forwarded += 1;
                    }
                }
                self.forwarded.fetch_add(forwarded, Ordering::Relaxed);
                self.discarded
                    .fetch_add(block.len() as u64 - forwarded, Ordering::Relaxed);
            });
        }
    }

    fn summary(&self) -> SamplerSummary {
        SamplerSummary {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSampler {
    /// Start sampling on the current Tokio runtime.
    pub fn start(
        stats: Vec<Arc<WorkerStats>>,
        sink: Arc<dyn MetricsSink>,
        warmup: Duration,
        interval: Duration,
    ) -> Self {
        let drain = Arc::new(Drain {
            stats,
            sink,
            warmup_end: (!warmup.is_zero()).then(|| Instant::now() + warmup),
            forwarded: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        });

        let ticker = drain.clone();
        let task = PeriodicTask::spawn("metrics sampler", interval, interval, move || {
            ticker.drain();
            trace!("Sampled latencies: {:?}", ticker.summary());
        });

        Self {
            task,
            drain,
            stopped: None,
        }
    }

    /// Stop sampling, drain whatever is left and return the totals. Further calls return the
    /// same totals without draining again.
    pub async fn stop(&mut self) -> SamplerSummary {
        if let Some(summary) = self.stopped {
            return summary;
        }

        self.task.stop().await;
        self.drain.drain();

        let summary = self.drain.summary();
        self.stopped = Some(summary);
        summary
    }
}
