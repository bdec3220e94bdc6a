use humantime::{format_duration, format_rfc3339_seconds};
use std::fmt;
use std::num::NonZeroU32;
use std::time::{Duration, SystemTime};

/// Aggregated results of one benchmark run, summed across all workers.
///
/// Only workers that reported a result are included; a worker which failed is excluded from
/// `total_operations`.
#[derive(Clone, Debug)]
pub struct RunStatistics {
    pub operation: String,
    pub threads: u32,
    pub clients: u32,
    pub per_worker_rate: Option<NonZeroU32>,
    pub total_operations: u64,
    pub failed_operations: u64,
    pub started_at: SystemTime,
    pub skip_duration: Duration,
    pub elapsed: Duration,
    pub latency: Option<LatencySummary>,
}

impl RunStatistics {
    /// Operations per second over the whole run, warm-up included.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0. {
            self.total_operations as f64 / secs
        } else {
            0.
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_operations > 0 {
            self.failed_operations as f64 / self.total_operations as f64
        } else {
            0.
        }
    }

    pub fn finished_at(&self) -> SystemTime {
        self.started_at + self.elapsed
    }

    /// Wall-clock window results should be reported for, i.e. the run minus its warm-up.
    pub fn measurement_window(&self) -> (SystemTime, SystemTime) {
        let end = self.finished_at();
        let start = (self.started_at + self.skip_duration).min(end);
        (start, end)
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} operations ({} failed) in {} [started {}], TPS={:.2}, ErrorRate={:.4}",
            self.operation,
            self.total_operations,
            self.failed_operations,
            format_duration(truncate_millis(self.elapsed)),
            format_rfc3339_seconds(self.started_at),
            self.throughput(),
            self.error_rate(),
        )?;

        if let Some(latency) = &self.latency {
            write!(f, ", {latency}")?;
        }

        Ok(())
    }
}

/// Latency quantiles over the measured (post warm-up) samples.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p50={:?}, p90={:?}, p99={:?} ({} samples)",
            self.p50, self.p90, self.p99, self.samples
        )
    }
}

fn truncate_millis(dur: Duration) -> Duration {
    Duration::from_millis(dur.as_millis() as u64)
}
