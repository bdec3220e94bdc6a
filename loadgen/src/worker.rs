use crate::limiter::RateLimiter;
use crate::stats::WorkerStats;
use crate::workload::{BoxError, Connection, Operation, OperationError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker {0} has no bound connection")]
    NoConnection(usize),

    #[error("Worker {index} stopped on an unrecoverable failure: {source}")]
    Fatal {
        index: usize,
        #[source]
        source: BoxError,
    },

    #[error("Worker {0} has not finished yet")]
    NotFinished(usize),

    #[error("Unable to build the runtime for worker {index}: {source}")]
    Runtime {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to spawn the thread for worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker {0} panicked")]
    Panicked(usize),

    #[error("Worker {0} terminated without reporting a result")]
    Lost(usize),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Finished,
}

/// One concurrent execution agent.
///
/// Repeatedly waits on its rate limiter, performs one operation on the next connection in
/// round-robin order and records the outcome, until its run duration has elapsed.
pub struct WorkerUnit<O: Operation> {
    index: usize,
    operation: O,
    connections: Vec<O::Connection>,
    next_connection: usize,
    limiter: Option<RateLimiter>,
    stats: Arc<WorkerStats>,
    run_duration: Duration,
    state: WorkerState,
}

impl<O: Operation> WorkerUnit<O> {
    pub fn new(index: usize, operation: O, run_duration: Duration, stats: Arc<WorkerStats>) -> Self {
        Self {
            index,
            operation,
            connections: vec![],
            next_connection: 0,
            limiter: None,
            stats,
            run_duration,
            state: WorkerState::Idle,
        }
    }

    /// Without a limiter the worker issues operations as fast as the service answers.
    pub fn set_rate_limiter(&mut self, limiter: RateLimiter) {
        self.limiter = Some(limiter);
    }

    pub fn add_connection(&mut self, connection: O::Connection) {
        self.connections.push(connection);
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[cfg(test)]
    pub(crate) fn connections(&self) -> &[O::Connection] {
        &self.connections
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_ref()
    }

    pub fn stats(&self) -> &Arc<WorkerStats> {
        &self.stats
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Run until the deadline and return the number of operations issued.
    ///
    /// Failed operations are counted and otherwise ignored. Only
    /// [`OperationError::Fatal`] ends the run early.
    pub async fn run(&mut self) -> Result<u64, WorkerError> {
        if self.connections.is_empty() {
            self.state = WorkerState::Finished;
            return Err(WorkerError::NoConnection(self.index));
        }

        self.state = WorkerState::Running;
        let res = self.run_until_deadline().await;
        self.state = WorkerState::Finished;

        match &res {
            Ok(issued) => debug!("Worker {} finished after {issued} operations", self.index),
            Err(err) => error!("{err}"),
        }
        res
    }

    // NOTE: This loop is time-sensitive. Anything besides the limiter and the operation itself
    // throws off the achieved rate.
    async fn run_until_deadline(&mut self) -> Result<u64, WorkerError> {
        let start = Instant::now();
        let mut issued = 0;

        loop {
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }

            let idx = self.next_connection;
            self.next_connection = (idx + 1) % self.connections.len();

            let op_start = Instant::now();
            let res = self.operation.perform(&mut self.connections[idx]).await;
            let latency = op_start.elapsed();
            issued += 1;

            match res {
                Ok(reported) => self.stats.record_success(reported.unwrap_or(latency)),
                Err(OperationError::Failed(err)) => {
                    self.stats.record_failure(latency);
                    trace!("Worker {} operation failed: {err}", self.index);
                }
                Err(OperationError::Fatal(source)) => {
                    self.stats.record_failure(latency);
                    return Err(WorkerError::Fatal {
                        index: self.index,
                        source,
                    });
                }
            }

            if start.elapsed() >= self.run_duration {
                break;
            }
        }

        Ok(issued)
    }

    /// Release every bound connection. Only allowed once the worker has finished.
    pub fn close_client_connections(&mut self) -> Result<(), WorkerError> {
        if self.state != WorkerState::Finished {
            return Err(WorkerError::NotFinished(self.index));
        }

        self.release_connections();
        Ok(())
    }

    /// Mark a worker whose run unwound as finished so its connections can still be released.
    pub(crate) fn mark_aborted(&mut self) {
        self.state = WorkerState::Finished;
    }

    /// Tear down a worker which never ran.
    pub(crate) fn discard(mut self) {
        self.release_connections();
    }

    fn release_connections(&mut self) {
        for connection in self.connections.drain(..) {
            connection.close();
        }
    }
}
