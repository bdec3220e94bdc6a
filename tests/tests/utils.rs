use loadgen::prelude::*;
use loadgen::BoxError;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() -> &'static PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

    HANDLE.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
            std::process::exit(1);
        }));

        FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_env_filter("loadgen=debug")
            .init();

        PrometheusBuilder::new().install_recorder().unwrap()
    })
}

#[allow(unused)]
pub fn config(threads: u32, clients: u32) -> loadgen::core::BenchmarkConfigBuilder {
    BenchmarkConfig::builder("localhost:8983,localhost:8984".parse().unwrap(), "test")
        .threads(threads)
        .clients(clients)
}

pub struct MockConnection {
    pub closed: Arc<AtomicUsize>,
}

impl Connection for MockConnection {
    fn close(self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
pub struct MockConnector {
    pub opened: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    fn open_connection(
        &self,
        _endpoints: &EndpointSet,
        _collection: &str,
    ) -> Result<MockConnection, BoxError> {
        self.opened.fetch_add(1, Ordering::Relaxed);
        Ok(MockConnection {
            closed: self.closed.clone(),
        })
    }
}

/// Sleeps for a normally distributed number of microseconds, failing with `failure_rate`.
pub struct MockOperation {
    delay: Option<Normal<f64>>,
    failure_rate: f64,
    fatal: bool,
    rng: SmallRng,
}

impl Operation for MockOperation {
    type Connection = MockConnection;

    async fn perform(
        &mut self,
        _connection: &mut MockConnection,
    ) -> Result<Option<Duration>, OperationError> {
        if let Some(delay) = &self.delay {
            let micros: f64 = delay.sample(&mut self.rng);
            tokio::time::sleep(Duration::from_micros(micros.max(0.).floor() as u64)).await;
        }

        if self.fatal {
            Err(OperationError::fatal("service gone"))
        } else if self.rng.gen_bool(self.failure_rate) {
            Err(OperationError::failed("bad request"))
        } else {
            Ok(None)
        }
    }
}

pub struct MockWorkload {
    pub kind: OperationKind,
    pub delay: Option<Normal<f64>>,
    pub failure_rate: f64,
    /// Number of operations, in creation order, which fail fatally on their first call.
    pub fatal: usize,
    created: AtomicUsize,
}

#[allow(unused)]
impl MockWorkload {
    pub fn noop(kind: OperationKind) -> Self {
        Self {
            kind,
            delay: None,
            failure_rate: 0.,
            fatal: 0,
            created: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(kind: OperationKind, mean_micros: f64) -> Self {
        Self {
            delay: Normal::new(mean_micros, mean_micros / 4.).ok(),
            ..Self::noop(kind)
        }
    }
}

impl Workload for MockWorkload {
    type Operation = MockOperation;

    fn name(&self) -> &str {
        match self.kind {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
        }
    }

    fn kind(&self) -> OperationKind {
        self.kind
    }

    fn new_operation(&self) -> MockOperation {
        let n = self.created.fetch_add(1, Ordering::Relaxed);
        MockOperation {
            delay: self.delay,
            failure_rate: self.failure_rate,
            fatal: n < self.fatal,
            rng: SmallRng::from_entropy(),
        }
    }
}
