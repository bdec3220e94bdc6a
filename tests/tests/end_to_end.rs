mod utils;
#[allow(unused)]
use utils::*;

use loadgen::prelude::*;
use loadgen::WorkerError;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

#[tokio::test]
#[ntest::timeout(10_000)]
async fn read_only_run_respects_target_throughput() {
    init();

    let config = config(2, 2)
        .skip_duration(Duration::from_secs(1))
        .run_duration(Duration::from_secs(2))
        .target_throughput(100)
        .write_percentage(0.)
        .build()
        .unwrap();

    let mut reads = BenchmarkOrchestrator::new(
        config.clone(),
        MockWorkload::noop(OperationKind::Read),
        MockConnector::default(),
    );
    let mut writes = BenchmarkOrchestrator::new(
        config,
        MockWorkload::noop(OperationKind::Write),
        MockConnector::default(),
    )
    .with_progress(false);

    let start = Instant::now();
    reads.start_benchmark().await.unwrap();
    writes.start_benchmark().await.unwrap();
    let (r, w) = tokio::join!(
        reads.wait_for_benchmark_run_to_finish(),
        writes.wait_for_benchmark_run_to_finish()
    );
    r.unwrap();
    w.unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");

    let total = reads.total_requests_sent_from_all_workers();
    assert!(total >= 2, "{total}");
    assert!(total <= 330, "{total}");
    assert_eq!(writes.total_requests_sent_from_all_workers(), 0);
    assert!(writes.run_statistics().is_none());

    let stats = reads.run_statistics().unwrap();
    assert_eq!(stats.total_operations, total);
    assert_eq!(stats.threads, 2);
    assert_eq!(stats.per_worker_rate.unwrap().get(), 50);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn mixed_workload_splits_capacity() {
    init();

    let config = config(4, 8)
        .run_duration(Duration::from_secs(1))
        .target_throughput(400)
        .write_percentage(0.25)
        .build()
        .unwrap();

    let reads_connector = MockConnector::default();
    let writes_connector = MockConnector::default();
    let read_closed = reads_connector.closed.clone();
    let write_closed = writes_connector.closed.clone();

    let mut reads = BenchmarkOrchestrator::new(
        config.clone(),
        MockWorkload::with_delay(OperationKind::Read, 500.),
        reads_connector,
    )
    .with_progress(false);
    let mut writes = BenchmarkOrchestrator::new(
        config,
        MockWorkload::with_delay(OperationKind::Write, 500.),
        writes_connector,
    )
    .with_progress(false);

    assert_eq!(reads.allocation().threads, 3);
    assert_eq!(reads.allocation().clients, 6);
    assert_eq!(writes.allocation().threads, 1);
    assert_eq!(writes.allocation().clients, 2);

    reads.start_benchmark().await.unwrap();
    writes.start_benchmark().await.unwrap();
    let (r, w) = tokio::join!(
        reads.wait_for_benchmark_run_to_finish(),
        writes.wait_for_benchmark_run_to_finish()
    );
    r.unwrap();
    w.unwrap();

    let read_total = reads.total_requests_sent_from_all_workers();
    let write_total = writes.total_requests_sent_from_all_workers();
    assert!(read_total <= 330, "{read_total}");
    assert!(write_total <= 110, "{write_total}");
    assert!(write_total < read_total);

    assert_eq!(read_closed.load(Ordering::Relaxed), 6);
    assert_eq!(write_closed.load(Ordering::Relaxed), 2);
}

#[tokio::test]
#[ntest::timeout(5_000)]
async fn unlimited_throughput() {
    init();

    let mut reads = BenchmarkOrchestrator::new(
        config(2, 2)
            .run_duration(Duration::from_millis(200))
            .build()
            .unwrap(),
        MockWorkload::noop(OperationKind::Read),
        MockConnector::default(),
    )
    .with_progress(false);

    assert!(reads.per_worker_rate().is_none());

    reads.start_benchmark().await.unwrap();
    reads.wait_for_benchmark_run_to_finish().await.unwrap();

    // Far beyond what any limited run of this length would issue.
    assert!(reads.total_requests_sent_from_all_workers() > 1_000);
}

#[tokio::test]
#[ntest::timeout(2_000)]
async fn zero_duration_is_a_no_op() {
    init();

    let connector = MockConnector::default();
    let mut reads = BenchmarkOrchestrator::new(
        config(4, 4)
            .run_duration(Duration::ZERO)
            .target_throughput(100)
            .build()
            .unwrap(),
        MockWorkload::noop(OperationKind::Read),
        connector,
    );

    reads.start_benchmark().await.unwrap();
    reads.wait_for_benchmark_run_to_finish().await.unwrap();
    assert_eq!(reads.total_requests_sent_from_all_workers(), 0);
    assert!(reads.run_statistics().is_none());
}

#[tokio::test]
#[ntest::timeout(5_000)]
async fn failing_operations_are_counted() {
    init();

    let mut workload = MockWorkload::with_delay(OperationKind::Read, 200.);
    workload.failure_rate = 0.5;

    let mut reads = BenchmarkOrchestrator::new(
        config(2, 4)
            .run_duration(Duration::from_millis(500))
            .target_throughput(200)
            .build()
            .unwrap(),
        workload,
        MockConnector::default(),
    )
    .with_progress(false);

    reads.start_benchmark().await.unwrap();
    reads.wait_for_benchmark_run_to_finish().await.unwrap();

    let stats = reads.run_statistics().unwrap();
    assert!(stats.total_operations > 10);
    assert!(stats.failed_operations > 0);
    assert!(stats.failed_operations < stats.total_operations);
    assert!(stats.error_rate() > 0. && stats.error_rate() < 1.);
}

#[tokio::test]
#[ntest::timeout(5_000)]
async fn fatal_failure_surfaces_after_all_workers_finish() {
    init();

    let mut workload = MockWorkload::noop(OperationKind::Read);
    workload.fatal = 1;
    let connector = MockConnector::default();
    let closed = connector.closed.clone();

    let mut reads = BenchmarkOrchestrator::new(
        config(3, 3)
            .run_duration(Duration::from_millis(300))
            .target_throughput(300)
            .build()
            .unwrap(),
        workload,
        connector,
    )
    .with_progress(false);

    reads.start_benchmark().await.unwrap();
    let err = reads.wait_for_benchmark_run_to_finish().await.unwrap_err();
    assert!(matches!(
        err,
        BenchmarkError::Worker(WorkerError::Fatal { index: 0, .. })
    ));

    // The two healthy workers still report.
    assert!(reads.total_requests_sent_from_all_workers() > 2);
    assert_eq!(closed.load(Ordering::Relaxed), 3);
}

#[tokio::test]
#[ntest::timeout(5_000)]
async fn latency_excludes_warm_up() {
    let prometheus = init();

    let mut reads = BenchmarkOrchestrator::new(
        config(2, 2)
            .skip_duration(Duration::from_millis(700))
            .run_duration(Duration::from_millis(800))
            .target_throughput(200)
            .collect_latency(true)
            .build()
            .unwrap(),
        MockWorkload::with_delay(OperationKind::Read, 1_000.),
        MockConnector::default(),
    )
    .with_progress(false);

    reads.start_benchmark().await.unwrap();
    reads.wait_for_benchmark_run_to_finish().await.unwrap();

    let stats = reads.run_statistics().unwrap();
    let latency = stats.latency.unwrap();
    assert!(latency.samples > 0);
    assert!(latency.samples < stats.total_operations);
    assert!(latency.p50 >= Duration::from_micros(200), "{latency}");
    assert!(latency.p50 <= latency.p99);

    assert!(prometheus.render().contains("read_latency"));
}
