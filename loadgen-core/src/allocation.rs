use crate::BenchmarkConfig;
use std::fmt;
use std::num::NonZeroU32;

/// The workload class an orchestrator drives.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Read,
    Write,
}

impl OperationKind {
    /// Share of the configured capacity this kind receives.
    pub fn scale_factor(self, write_percentage: f64) -> f64 {
        match self {
            OperationKind::Read => 1. - write_percentage,
            OperationKind::Write => write_percentage,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Read => write!(f, "read"),
            OperationKind::Write => write!(f, "write"),
        }
    }
}

/// Threads, clients and throughput scaled to one workload class.
///
/// Computed once from a [`BenchmarkConfig`] when an orchestrator is created.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DerivedAllocation {
    pub threads: u32,
    pub clients: u32,
    pub target_throughput: u32,
}

impl DerivedAllocation {
    /// Scale every base value by `scale_factor`, truncating toward zero.
    pub fn derive(config: &BenchmarkConfig, scale_factor: f64) -> Self {
        Self {
            threads: scale(config.threads(), scale_factor),
            clients: scale(config.clients(), scale_factor),
            target_throughput: scale(config.target_throughput(), scale_factor),
        }
    }

    /// Rate each worker is limited to, or `None` when throughput is unlimited.
    ///
    /// `ceil(target / threads)` clamped to at least one, so the realized aggregate rate may
    /// slightly exceed the target but never falls below it.
    pub fn per_worker_rate(&self) -> Option<NonZeroU32> {
        if self.threads == 0 || self.target_throughput == 0 {
            return None;
        }

        let rate = self.target_throughput.div_ceil(self.threads);
        NonZeroU32::new(rate.max(1))
    }

    /// Owning worker index for each connection to open, in opening order.
    ///
    /// With at least as many clients as threads, client `i` goes to worker `i % threads`.
    /// Otherwise exactly one connection is opened per worker and the surplus threads do not
    /// share.
    pub fn connection_assignments(&self) -> Vec<usize> {
        if self.threads == 0 {
            return vec![];
        }

        let connections = self.clients.max(self.threads);
        (0..connections)
            .map(|i| (i % self.threads) as usize)
            .collect()
    }
}

fn scale(value: u32, factor: f64) -> u32 {
    if factor > 0. {
        // NOTE: Float to int casts saturate, which is what we want for oversized factors.
        (value as f64 * factor) as u32
    } else {
        0
    }
}
