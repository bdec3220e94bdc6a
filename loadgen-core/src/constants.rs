use std::time::Duration;

/// Threads used when a configuration does not say otherwise.
pub const DEFAULT_THREADS: u32 = 1;

/// Client connections used when a configuration does not say otherwise.
pub const DEFAULT_CLIENTS: u32 = 1;

/// Measured run duration used when a configuration does not say otherwise.
pub const DEFAULT_RUN_DURATION: Duration = Duration::from_secs(60);

/// Delay before the first ETA line is printed.
pub const PROGRESS_INITIAL_DELAY: Duration = Duration::from_secs(5);

/// Interval between ETA lines.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Interval at which latency samples are drained from the workers.
pub const SAMPLER_INTERVAL: Duration = Duration::from_millis(500);

/// Documents pushed between two index size checks during bulk ingest.
pub const DEFAULT_INGEST_BATCH_SIZE: usize = 10_000;

/// Index size at which bulk ingest stops (5 GiB).
pub const DEFAULT_INGEST_SIZE_CAP: u64 = 5 * 1024 * 1024 * 1024;
