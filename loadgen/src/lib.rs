#![cfg_attr(docsrs, feature(doc_cfg))]
//! Rate-limited benchmark driver.
//!
//! A [`BenchmarkOrchestrator`] splits the configured capacity between workload classes, runs
//! one [`WorkerUnit`] per configured thread on a fixed pool of OS threads, limits each worker
//! to its share of the target throughput and aggregates the per-worker results once every
//! worker reached its deadline.
//!
//! # Example
//! ```no_run
//! use loadgen::prelude::*;
//! # use loadgen::BoxError;
//! # use std::time::Duration;
//! # struct Noop;
//! # impl Connection for Noop { fn close(self) {} }
//! # struct NoopConnector;
//! # impl Connector for NoopConnector {
//! #     type Connection = Noop;
//! #     fn open_connection(&self, _: &EndpointSet, _: &str) -> Result<Noop, BoxError> { Ok(Noop) }
//! # }
//! # struct Ping;
//! # impl Operation for Ping {
//! #     type Connection = Noop;
//! #     async fn perform(&mut self, _: &mut Noop) -> Result<Option<Duration>, OperationError> { Ok(None) }
//! # }
//! # struct Reads;
//! # impl Workload for Reads {
//! #     type Operation = Ping;
//! #     fn name(&self) -> &str { "read" }
//! #     fn kind(&self) -> OperationKind { OperationKind::Read }
//! #     fn new_operation(&self) -> Ping { Ping }
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BenchmarkConfig::builder("localhost:8983".parse()?, "test")
//!         .threads(4)
//!         .clients(8)
//!         .run_duration(Duration::from_secs(60))
//!         .target_throughput(1_000)
//!         .build()?;
//!
//!     let mut orchestrator = BenchmarkOrchestrator::new(config, Reads, NoopConnector);
//!     orchestrator.start_benchmark().await?;
//!     orchestrator.wait_for_benchmark_run_to_finish().await?;
//!     println!("{}", orchestrator.total_requests_sent_from_all_workers());
//!     Ok(())
//! }
//! ```

mod error;
pub mod ingest;
mod limiter;
mod orchestrator;
mod periodic;
mod pool;
mod progress;
mod sampler;
pub mod sink;
mod stats;
mod worker;
mod workload;

pub use error::BenchmarkError;
pub use limiter::{LimiterError, RateLimiter};
pub use orchestrator::BenchmarkOrchestrator;
pub use progress::{ProgressReporter, ProgressState};
pub use sampler::{MetricsSampler, SamplerSummary};
pub use stats::{LatencySample, WorkerStats};
pub use worker::{WorkerError, WorkerState, WorkerUnit};
pub use workload::{BoxError, Connection, Connector, Operation, OperationError, Workload};

#[doc(hidden)]
pub use loadgen_core as core;

pub mod prelude {
    pub use crate::sink::MetricsSink;
    pub use crate::{
        BenchmarkError, BenchmarkOrchestrator, Connection, Connector, Operation, OperationError,
        Workload,
    };
    pub use loadgen_core::{
        BenchmarkConfig, DerivedAllocation, EndpointSet, OperationKind, RunStatistics,
    };
}
