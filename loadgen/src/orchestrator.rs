use crate::error::BenchmarkError;
use crate::limiter::RateLimiter;
use crate::pool::WorkerPool;
use crate::progress::{ProgressReporter, ProgressState};
use crate::sampler::MetricsSampler;
use crate::sink::{DigestSink, FanoutSink, MetricsSink};
use crate::stats::WorkerStats;
use crate::worker::WorkerUnit;
use crate::workload::{Connector, Operation, Workload};
use humantime::format_duration;
use loadgen_core::{BenchmarkConfig, DerivedAllocation, RunStatistics, SAMPLER_INTERVAL};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

type ConnectionOf<W> = <<W as Workload>::Operation as Operation>::Connection;

/// Drives one workload class through a complete benchmark run.
///
/// The configured threads, clients and throughput are scaled by the workload's share once, at
/// construction. A run is started with [`start_benchmark`](Self::start_benchmark) and collected
/// with [`wait_for_benchmark_run_to_finish`](Self::wait_for_benchmark_run_to_finish); both must
/// be called from within a Tokio runtime, which hosts the sampler and the progress reporter.
/// The workers themselves run on dedicated threads.
pub struct BenchmarkOrchestrator<W, C>
where
    W: Workload,
    C: Connector<Connection = ConnectionOf<W>>,
{
    config: BenchmarkConfig,
    workload: W,
    connector: C,
    allocation: DerivedAllocation,
    per_worker_rate: Option<NonZeroU32>,
    sinks: Vec<Arc<dyn MetricsSink>>,
    show_progress: bool,
    progress: ProgressState,
    pool: Option<WorkerPool<W::Operation>>,
    worker_stats: Vec<Arc<WorkerStats>>,
    sampler: Option<MetricsSampler>,
    reporter: Option<ProgressReporter>,
    digest: Option<Arc<DigestSink>>,
    statistics: Option<RunStatistics>,
}

impl<W, C> BenchmarkOrchestrator<W, C>
where
    W: Workload,
    C: Connector<Connection = ConnectionOf<W>>,
{
    pub fn new(config: BenchmarkConfig, workload: W, connector: C) -> Self {
        let allocation =
            DerivedAllocation::derive(&config, workload.scale_factor(config.write_percentage()));

        Self {
            config,
            workload,
            connector,
            allocation,
            per_worker_rate: allocation.per_worker_rate(),
            sinks: vec![],
            show_progress: true,
            progress: ProgressState::default(),
            pool: None,
            worker_stats: vec![],
            sampler: None,
            reporter: None,
            digest: None,
            statistics: None,
        }
    }

    /// Additional destination for latency samples. Only used when latency collection is on.
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Enable or disable the console ETA line (on by default).
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn operation_name(&self) -> &str {
        self.workload.name()
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    pub fn allocation(&self) -> DerivedAllocation {
        self.allocation
    }

    pub fn per_worker_rate(&self) -> Option<NonZeroU32> {
        self.per_worker_rate
    }

    pub fn total_run_duration(&self) -> Duration {
        self.config.total_duration()
    }

    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    pub fn operation_start_time(&self) -> Option<SystemTime> {
        self.progress.started_at()
    }

    /// Results of the last completed run.
    pub fn run_statistics(&self) -> Option<&RunStatistics> {
        self.statistics.as_ref()
    }

    /// Build the workers, bind their connections and launch them.
    ///
    /// A run with zero threads, clients or duration is skipped with a warning.
    #[instrument(name = "benchmark", skip_all, fields(operation = self.workload.name()))]
    pub async fn start_benchmark(&mut self) -> Result<(), BenchmarkError> {
        let total = self.total_run_duration();
        let DerivedAllocation {
            threads, clients, ..
        } = self.allocation;

        if total.is_zero() || threads == 0 || clients == 0 {
            warn!(
                "Total run duration (skip + measurement): {} | threads: {threads} | clients: {clients}. \
                 All of these must be non-zero; skipping operation {}.",
                format_duration(total),
                self.operation_name(),
            );
            return Ok(());
        }

        if self.pool.is_some() {
            return Err(BenchmarkError::AlreadyStarted(
                self.operation_name().to_string(),
            ));
        }

        self.print_config();
        let workers = self.create_and_configure_workers(total)?;
        self.worker_stats = workers.iter().map(|w| w.stats().clone()).collect();

        if self.config.collect_latency() {
            self.start_sampler();
        }

        self.progress.mark_started();

        if self.show_progress {
            self.reporter = Some(ProgressReporter::start(
                self.workload.name(),
                total,
                &self.progress,
            ));
        }

        let pool = WorkerPool::launch(workers);
        info!("Started {} workers", pool.len());
        self.pool = Some(pool);

        Ok(())
    }

    /// Block until every worker has finished, then stop the background tasks, release all
    /// connections and aggregate the results.
    ///
    /// The first worker failure, in worker order, is returned once the rest have finished;
    /// statistics are still aggregated from the workers that succeeded. Calling this again
    /// after it returned is a no-op.
    #[instrument(name = "benchmark", skip_all, fields(operation = self.workload.name()))]
    pub async fn wait_for_benchmark_run_to_finish(&mut self) -> Result<(), BenchmarkError> {
        if self.progress.is_finished() {
            return Ok(());
        }
        let Some(pool) = self.pool.as_mut() else {
            return Ok(());
        };

        let joined = pool.join().await;

        if let Some(mut sampler) = self.sampler.take() {
            let summary = sampler.stop().await;
            debug!(
                "Latency samples forwarded: {}, dropped during warm-up: {}",
                summary.forwarded, summary.discarded
            );
        }

        if let Some(mut reporter) = self.reporter.take() {
            reporter.cancel().await;
        }

        self.progress.mark_finished();
        self.close_all_client_connections();

        let statistics = self.collect_statistics();
        info!("{statistics}");
        self.statistics = Some(statistics);

        joined.map_err(BenchmarkError::from)
    }

    /// Operations issued by all workers together.
    ///
    /// Returns `0` with a warning while any worker is still running; never blocks.
    pub fn total_requests_sent_from_all_workers(&mut self) -> u64 {
        let Some(pool) = self.pool.as_mut() else {
            return 0;
        };

        pool.total_operations().unwrap_or_else(|| {
            warn!("One or more workers are still running");
            0
        })
    }

    fn create_and_configure_workers(
        &self,
        duration: Duration,
    ) -> Result<Vec<WorkerUnit<W::Operation>>, BenchmarkError> {
        let collect_latency = self.config.collect_latency();

        let mut workers: Vec<_> = (0..self.allocation.threads as usize)
            .map(|index| {
                let stats = Arc::new(WorkerStats::new(collect_latency));
                let mut worker =
                    WorkerUnit::new(index, self.workload.new_operation(), duration, stats);
                if let Some(rate) = self.per_worker_rate {
                    worker.set_rate_limiter(RateLimiter::with_rate(rate));
                }
                worker
            })
            .collect();

        for owner in self.allocation.connection_assignments() {
            match self
                .connector
                .open_connection(self.config.endpoints(), self.config.collection())
            {
                Ok(connection) => workers[owner].add_connection(connection),
                Err(source) => {
                    workers.into_iter().for_each(WorkerUnit::discard);
                    return Err(BenchmarkError::Connection {
                        endpoints: self.config.endpoints().to_string(),
                        collection: self.config.collection().to_string(),
                        source,
                    });
                }
            }
        }

        Ok(workers)
    }

    fn start_sampler(&mut self) {
        let digest = Arc::new(DigestSink::new());
        let mut sinks: Vec<Arc<dyn MetricsSink>> = vec![digest.clone()];

        #[cfg(feature = "metrics")]
        sinks.push(Arc::new(crate::sink::HistogramSink::new(format!(
            "{}_latency",
            self.workload.name()
        ))));

        sinks.extend(self.sinks.iter().cloned());

        self.sampler = Some(MetricsSampler::start(
            self.worker_stats.clone(),
            Arc::new(FanoutSink::new(sinks)),
            self.config.skip_duration(),
            SAMPLER_INTERVAL,
        ));
        self.digest = Some(digest);
    }

    fn close_all_client_connections(&mut self) {
        let Some(pool) = self.pool.as_mut() else {
            return;
        };

        for worker in pool.finished_workers() {
            if let Err(err) = worker.close_client_connections() {
                warn!("Unable to close connections: {err}");
            }
        }
    }

    fn collect_statistics(&mut self) -> RunStatistics {
        let total_operations = self.total_requests_sent_from_all_workers();
        let failed_operations = self.worker_stats.iter().map(|s| s.failed()).sum();

        RunStatistics {
            operation: self.workload.name().to_string(),
            threads: self.allocation.threads,
            clients: self.allocation.clients,
            per_worker_rate: self.per_worker_rate,
            total_operations,
            failed_operations,
            started_at: self.progress.started_at().unwrap_or_else(SystemTime::now),
            skip_duration: self.config.skip_duration(),
            elapsed: self.progress.elapsed().unwrap_or_default(),
            latency: self.digest.as_ref().and_then(|d| d.summary()),
        }
    }

    fn print_config(&self) {
        info!(
            " ======================== {} ======================== ",
            self.operation_name()
        );
        match hostname::get() {
            Ok(host) => info!("{:<30} : {}", "hostname", host.to_string_lossy()),
            Err(err) => warn!("Unable to resolve the local hostname: {err}"),
        }
        info!("{:<30} : {}", "endpoints", self.config.endpoints());
        info!("{:<30} : {}", "collection", self.config.collection());
        info!("{:<30} : {}", "threads", self.allocation.threads);
        info!("{:<30} : {}", "clients", self.allocation.clients);
        info!(
            "{:<30} : {}",
            "skipDuration",
            format_duration(self.config.skip_duration())
        );
        info!(
            "{:<30} : {}",
            "runDuration",
            format_duration(self.config.run_duration())
        );
        info!(
            "{:<30} : {}",
            "targetThroughput", self.allocation.target_throughput
        );
        match self.per_worker_rate {
            Some(rate) => info!("{:<30} : {}", "perWorkerThroughput", rate),
            None => info!("{:<30} : unlimited", "perWorkerThroughput"),
        }
        info!(
            "{:<30} : {}",
            "collectLatency",
            self.config.collect_latency()
        );
    }
}
