use crate::periodic::PeriodicTask;
use loadgen_core::{PROGRESS_INITIAL_DELAY, PROGRESS_INTERVAL};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Start and end of a run, plus the elapsed seconds counter the ETA line is based on.
#[derive(Debug, Default)]
pub struct ProgressState {
    started: Option<(Instant, SystemTime)>,
    finished: Option<Instant>,
    elapsed_secs: Arc<AtomicU64>,
}

impl ProgressState {
    pub fn mark_started(&mut self) {
        self.started = Some((Instant::now(), SystemTime::now()));
        self.finished = None;
        self.elapsed_secs.store(0, Ordering::Relaxed);
    }

    pub fn mark_finished(&mut self) {
        self.finished = Some(Instant::now());
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.started.map(|(_, wall)| wall)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Time from start to finish, or to now while the run is live.
    pub fn elapsed(&self) -> Option<Duration> {
        let (start, _) = self.started?;
        Some(match self.finished {
            Some(end) => end.duration_since(start),
            None => start.elapsed(),
        })
    }

    /// Seconds counted by the progress reporter so far.
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs.load(Ordering::Relaxed)
    }
}

/// Prints an estimated time remaining to the console once a second.
///
/// Purely cosmetic. The first line appears five seconds into the run.
pub struct ProgressReporter {
    task: PeriodicTask,
    ticks: Arc<AtomicU64>,
}

impl ProgressReporter {
    pub fn start(operation: &str, total: Duration, state: &ProgressState) -> Self {
        let operation = operation.to_string();
        let total_secs = total.as_secs();
        let elapsed = state.elapsed_secs.clone();
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();

        let task = PeriodicTask::spawn(
            "progress reporter",
            PROGRESS_INITIAL_DELAY,
            PROGRESS_INTERVAL,
            move || {
                let tick = counter.fetch_add(1, Ordering::Relaxed);
                let elapsed_secs = PROGRESS_INITIAL_DELAY.as_secs() + tick * PROGRESS_INTERVAL.as_secs();
                elapsed.store(elapsed_secs, Ordering::Relaxed);

                let mut stdout = std::io::stdout().lock();
                let _ = write!(stdout, "\r{}", eta_line(&operation, total_secs, elapsed_secs));
                let _ = stdout.flush();
            },
        );

        Self { task, ticks }
    }

    /// Stop printing. A line in flight is completed first.
    pub async fn cancel(&mut self) {
        self.task.stop().await;

        // Move off the ETA line so later log output starts on a fresh one.
        if self.ticks.swap(0, Ordering::Relaxed) > 0 {
            println!();
        }
    }
}

fn eta_line(operation: &str, total_secs: u64, elapsed_secs: u64) -> String {
    format!(
        "Approx. ETA for operation {operation} to complete : {} sec",
        total_secs.saturating_sub(elapsed_secs)
    )
}
