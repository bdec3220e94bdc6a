use crate::worker::WorkerError;
use crate::workload::BoxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("Benchmark {0} was already started")]
    AlreadyStarted(String),

    #[error("Unable to open a connection to {endpoints} ({collection}): {source}")]
    Connection {
        endpoints: String,
        collection: String,
        #[source]
        source: BoxError,
    },

    #[error("Worker failed: {0}")]
    Worker(#[from] WorkerError),
}
