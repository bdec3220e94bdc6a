//! In-process stand-in for a search service: operations sleep for a skew-normal latency and fail
//! with a fixed probability.

use loadgen::ingest::{Document, IndexClient};
use loadgen::prelude::*;
use loadgen::BoxError;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, SkewNormal};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, trace};

#[derive(Copy, Clone, Debug)]
pub struct LatencyModel {
    distribution: SkewNormal<f64>,
    failure_rate: f64,
}

impl LatencyModel {
    /// `mean_ms` is the location of the distribution; the long tail is to the right.
    pub fn new(mean_ms: f64, failure_rate: f64) -> anyhow::Result<Self> {
        let distribution = SkewNormal::new(mean_ms, (mean_ms / 4.).max(0.01), 4.)?;
        Ok(Self {
            distribution,
            failure_rate: failure_rate.clamp(0., 1.),
        })
    }

    fn sample(&self, rng: &mut SmallRng) -> Duration {
        let ms: f64 = self.distribution.sample(rng);
        Duration::from_secs_f64(ms.max(0.) / 1_000.)
    }
}

pub struct SimulatedConnection {
    id: usize,
    served: u64,
}

impl Connection for SimulatedConnection {
    fn close(self) {
        trace!("Closing connection {} after {} operations", self.id, self.served);
    }
}

#[derive(Default)]
pub struct SimulatedConnector {
    opened: AtomicUsize,
}

impl Connector for SimulatedConnector {
    type Connection = SimulatedConnection;

    fn open_connection(
        &self,
        endpoints: &EndpointSet,
        collection: &str,
    ) -> Result<SimulatedConnection, BoxError> {
        let id = self.opened.fetch_add(1, Ordering::Relaxed);
        debug!("Opening connection {id} to {endpoints}/{collection}");
        Ok(SimulatedConnection { id, served: 0 })
    }
}

pub struct SimulatedOperation {
    model: LatencyModel,
    rng: SmallRng,
}

impl Operation for SimulatedOperation {
    type Connection = SimulatedConnection;

    async fn perform(
        &mut self,
        connection: &mut SimulatedConnection,
    ) -> Result<Option<Duration>, OperationError> {
        let latency = self.model.sample(&mut self.rng);
        tokio::time::sleep(latency).await;
        connection.served += 1;

        if self.rng.gen_bool(self.model.failure_rate) {
            Err(OperationError::failed("simulated failure"))
        } else {
            Ok(Some(latency))
        }
    }
}

pub struct SimulatedWorkload {
    kind: OperationKind,
    model: LatencyModel,
}

impl SimulatedWorkload {
    pub fn new(kind: OperationKind, model: LatencyModel) -> Self {
        Self { kind, model }
    }
}

impl Workload for SimulatedWorkload {
    type Operation = SimulatedOperation;

    fn name(&self) -> &str {
        match self.kind {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
        }
    }

    fn kind(&self) -> OperationKind {
        self.kind
    }

    fn new_operation(&self) -> SimulatedOperation {
        SimulatedOperation {
            model: self.model,
            rng: SmallRng::from_entropy(),
        }
    }
}

/// Index which keeps only a document count and the serialized size of what it was given.
#[derive(Debug, Default)]
pub struct SimulatedIndex {
    documents: u64,
    bytes: u64,
    committed_bytes: u64,
}

impl IndexClient for SimulatedIndex {
    fn delete_all(&mut self) -> Result<(), BoxError> {
        *self = Self::default();
        Ok(())
    }

    fn add(&mut self, document: Document) -> Result<(), BoxError> {
        self.bytes += serde_json::to_vec(&document)?.len() as u64;
        self.documents += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), BoxError> {
        self.committed_bytes = self.bytes;
        Ok(())
    }

    fn optimize(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    fn index_size_bytes(&mut self) -> Result<u64, BoxError> {
        Ok(self.committed_bytes)
    }
}
