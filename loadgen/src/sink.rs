//! Destinations for latency samples drained by the [`MetricsSampler`](crate::MetricsSampler).
use loadgen_core::LatencySummary;
use pdatastructs::tdigest::{TDigest, K1};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::error;

const TDIGEST_BACKLOG_SIZE: usize = 100;

pub trait MetricsSink: Send + Sync {
    fn record(&self, latency: Duration);
}

impl<S: MetricsSink + ?Sized> MetricsSink for Arc<S> {
    fn record(&self, latency: Duration) {
        (**self).record(latency)
    }
}

/// Forward samples to an external recorder.
pub struct FnSink<F>(pub F);

impl<F> MetricsSink for FnSink<F>
where
    F: Fn(Duration) + Send + Sync,
{
    fn record(&self, latency: Duration) {
        (self.0)(latency)
    }
}

/// Record samples into a `metrics` histogram, in nanoseconds.
#[cfg(feature = "metrics")]
#[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
pub struct HistogramSink {
    histogram: metrics::Histogram,
}

#[cfg(feature = "metrics")]
impl HistogramSink {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        metrics::describe_histogram!(name.clone(), metrics::Unit::Nanoseconds, "Operation latency");
        Self {
            histogram: metrics::histogram!(name),
        }
    }
}

#[cfg(feature = "metrics")]
impl MetricsSink for HistogramSink {
    fn record(&self, latency: Duration) {
        self.histogram.record(latency.as_nanos() as f64);
    }
}

/// Keep a t-digest of every sample, for the quantiles of the final summary.
pub struct DigestSink {
    digest: Mutex<TDigest<K1>>,
    count: AtomicU64,
}

impl DigestSink {
    pub fn new() -> Self {
        Self {
            digest: Mutex::new(default_tdigest()),
            count: AtomicU64::new(0),
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// `None` until at least one sample was recorded.
    pub fn summary(&self) -> Option<LatencySummary> {
        let samples = self.count();
        if samples == 0 {
            return None;
        }

        let digest = self.digest.lock().unwrap_or_else(PoisonError::into_inner);
        Some(LatencySummary {
            samples,
            p50: quantile(&digest, 0.5),
            p90: quantile(&digest, 0.9),
            p99: quantile(&digest, 0.99),
        })
    }
}

impl Default for DigestSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for DigestSink {
    fn record(&self, latency: Duration) {
        self.digest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(latency.as_secs_f64());
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Record every sample into each of the inner sinks.
pub struct FanoutSink(Vec<Arc<dyn MetricsSink>>);

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn MetricsSink>>) -> Self {
        Self(sinks)
    }
}

impl MetricsSink for FanoutSink {
    fn record(&self, latency: Duration) {
        for sink in &self.0 {
            sink.record(latency);
        }
    }
}

fn quantile(digest: &TDigest<K1>, q: f64) -> Duration {
    let secs = digest.quantile(q);

    // NOTE: TDigest occasionally yields NaN on sparse data.
    if secs.is_finite() && secs >= 0. {
        Duration::from_secs_f64(secs)
    } else {
        error!("Invalid latency quantile {q}: {secs}");
        Duration::ZERO
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    #[test]
    fn empty_digest_has_no_summary() {
        assert!(DigestSink::new().summary().is_none());
    }

    #[test]
    fn digest_quantiles() {
        let sink = DigestSink::new();
        for ms in 1..=1_000 {
            sink.record(Duration::from_millis(ms));
        }

        let summary = sink.summary().unwrap();
        assert_eq!(summary.samples, 1_000);
        assert!(summary.p50 > Duration::from_millis(450) && summary.p50 < Duration::from_millis(550));
        assert!(summary.p99 > Duration::from_millis(950));
        assert!(summary.p50 <= summary.p90 && summary.p90 <= summary.p99);
    }

    #[test]
    fn digest_normal_latencies() {
        let sink = DigestSink::new();
        let normal = Normal::new(0.010, 0.001).unwrap();
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let v: f64 = normal.sample(&mut rng);
            sink.record(Duration::from_secs_f64(v.max(0.)));
        }

        let p50 = sink.summary().unwrap().p50;
        assert!(p50 > Duration::from_micros(9_500) && p50 < Duration::from_micros(10_500));
    }

    #[test]
    fn fanout_and_fn_sink() {
        let seen = Arc::new(AtomicU64::new(0));
        let counter = seen.clone();
        let digest = Arc::new(DigestSink::new());

        let fanout = FanoutSink::new(vec![
            digest.clone(),
            Arc::new(FnSink(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            })),
        ]);

        fanout.record(Duration::from_millis(1));
        fanout.record(Duration::from_millis(2));

        assert_eq!(seen.load(Ordering::Relaxed), 2);
        assert_eq!(digest.count(), 2);
    }
}
