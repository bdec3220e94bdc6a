use anyhow::Context;
use clap::Parser;
use loadgen::ingest::IngestSession;
use loadgen::prelude::*;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
#[allow(unused)]
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

mod simulated;

use simulated::{LatencyModel, SimulatedConnector, SimulatedIndex, SimulatedWorkload};

/// Drive a simulated search service with a mixed read/write workload.
#[derive(Parser, Debug)]
#[command(version = "0.1")]
struct Cli {
    /// JSON configuration file. Flags given on the command line take precedence.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    endpoints: Option<EndpointSet>,

    #[arg(long)]
    collection: Option<String>,

    #[arg(short, long)]
    threads: Option<u32>,

    #[arg(long)]
    clients: Option<u32>,

    #[arg(long, value_parser = humantime::parse_duration)]
    skip_duration: Option<Duration>,

    #[arg(long, value_parser = humantime::parse_duration)]
    run_duration: Option<Duration>,

    /// Aggregate operations per second. 0 disables rate limiting.
    #[arg(long)]
    target_throughput: Option<u32>,

    #[arg(short, long)]
    write_percentage: Option<f64>,

    #[arg(long)]
    collect_latency: bool,

    /// Location of the simulated latency distribution, in milliseconds.
    #[arg(long, default_value_t = 5.)]
    latency_ms: f64,

    /// Probability of a simulated operation failing.
    #[arg(long, default_value_t = 0.01)]
    failure_rate: f64,

    /// Ingest this JSON document stream into the simulated index before the run.
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    prometheus: Option<SocketAddr>,
}

impl Cli {
    fn benchmark_config(&self) -> anyhow::Result<BenchmarkConfig> {
        let mut builder = match &self.config {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("Unable to open {}", path.display()))?;
                let config: BenchmarkConfig = serde_json::from_reader(BufReader::new(file))
                    .with_context(|| format!("Invalid configuration in {}", path.display()))?;
                config.into_builder()
            }
            None => BenchmarkConfig::builder("localhost:8983".parse()?, "test"),
        };

        if let Some(endpoints) = &self.endpoints {
            builder = builder.endpoints(endpoints.clone());
        }
        if let Some(collection) = &self.collection {
            builder = builder.collection(collection.clone());
        }
        if let Some(threads) = self.threads {
            builder = builder.threads(threads);
        }
        if let Some(clients) = self.clients {
            builder = builder.clients(clients);
        }
        if let Some(skip) = self.skip_duration {
            builder = builder.skip_duration(skip);
        }
        if let Some(run) = self.run_duration {
            builder = builder.run_duration(run);
        }
        if let Some(tps) = self.target_throughput {
            builder = builder.target_throughput(tps);
        }
        if let Some(write_percentage) = self.write_percentage {
            builder = builder.write_percentage(write_percentage);
        }
        if self.collect_latency {
            builder = builder.collect_latency(true);
        }

        Ok(builder.build()?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "loadgen=info,loadgen_benchmark=info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.benchmark_config()?;

    if let Some(addr) = cli.prometheus {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Unable to start the Prometheus exporter")?;
    }

    if let Some(path) = cli.seed.clone() {
        let report = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            let file = File::open(&path)
                .with_context(|| format!("Unable to open {}", path.display()))?;
            let mut session = IngestSession::new(SimulatedIndex::default());
            Ok(session.run(BufReader::new(file))?)
        })
        .await??;
        info!("Seeded index: {report:?}");
    }

    let model = LatencyModel::new(cli.latency_ms, cli.failure_rate)?;
    let reads_shown = config.write_percentage() <= 0.5;

    let mut reads = BenchmarkOrchestrator::new(
        config.clone(),
        SimulatedWorkload::new(OperationKind::Read, model),
        SimulatedConnector::default(),
    )
    .with_progress(reads_shown);

    let mut writes = BenchmarkOrchestrator::new(
        config,
        SimulatedWorkload::new(OperationKind::Write, model),
        SimulatedConnector::default(),
    )
    .with_progress(!reads_shown);

    let result = run_together(&mut reads, &mut writes).await;

    for stats in [reads.run_statistics(), writes.run_statistics()]
        .into_iter()
        .flatten()
    {
        println!("{stats}");
    }

    Ok(result?)
}

/// Run both workloads side by side. When the second one cannot start, the first is still waited
/// for so its workers wind down and its connections are closed.
async fn run_together<RW, RC, WW, WC>(
    reads: &mut BenchmarkOrchestrator<RW, RC>,
    writes: &mut BenchmarkOrchestrator<WW, WC>,
) -> Result<(), BenchmarkError>
where
    RW: Workload,
    RC: Connector<Connection = <RW::Operation as Operation>::Connection>,
    WW: Workload,
    WC: Connector<Connection = <WW::Operation as Operation>::Connection>,
{
    reads.start_benchmark().await?;

    if let Err(err) = writes.start_benchmark().await {
        if let Err(read_err) = reads.wait_for_benchmark_run_to_finish().await {
            warn!("{} failed while winding down: {read_err}", reads.operation_name());
        }
        return Err(err);
    }

    let (read_result, write_result) = tokio::join!(
        reads.wait_for_benchmark_run_to_finish(),
        writes.wait_for_benchmark_run_to_finish(),
    );
    read_result.and(write_result)
}
