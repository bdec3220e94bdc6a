use loadgen_core::{EndpointSet, OperationKind};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of a single operation.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Counted as a failed operation. The worker carries on with its next operation.
    #[error("Operation failed: {0}")]
    Failed(#[source] BoxError),

    /// Stops the worker. Surfaces from
    /// [`wait_for_benchmark_run_to_finish`](crate::BenchmarkOrchestrator::wait_for_benchmark_run_to_finish).
    #[error("Unrecoverable operation failure: {0}")]
    Fatal(#[source] BoxError),
}

impl OperationError {
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(err.into())
    }

    pub fn fatal(err: impl Into<BoxError>) -> Self {
        Self::Fatal(err.into())
    }
}

/// A connection to the service under test, exclusively owned by one worker.
pub trait Connection: Send + 'static {
    fn close(self);
}

/// Opens connections to the service under test.
pub trait Connector: Send + Sync {
    type Connection: Connection;

    fn open_connection(
        &self,
        endpoints: &EndpointSet,
        collection: &str,
    ) -> Result<Self::Connection, BoxError>;
}

/// One unit of work issued against a connection.
///
/// Each worker owns its own instance, so implementations may keep per-worker state (random
/// generators, request templates, ...). The returned future runs on the worker's own thread and
/// does not need to be `Send`.
///
/// A successful operation may report the latency observed by the service; `None` lets the
/// worker use the wall-clock time it measured around the call.
pub trait Operation: Send + 'static {
    type Connection: Connection;

    fn perform(
        &mut self,
        connection: &mut Self::Connection,
    ) -> impl Future<Output = Result<Option<Duration>, OperationError>>;
}

/// A benchmark kind (read-only, write-only, ...) injected into the orchestrator.
pub trait Workload: Send + Sync {
    type Operation: Operation;

    /// Name used in logs, metrics and the ETA line.
    fn name(&self) -> &str;

    fn kind(&self) -> OperationKind;

    /// Share of the configured threads, clients and throughput this workload receives.
    fn scale_factor(&self, write_percentage: f64) -> f64 {
        self.kind().scale_factor(write_percentage)
    }

    /// A fresh operation for one worker slot.
    fn new_operation(&self) -> Self::Operation;
}
