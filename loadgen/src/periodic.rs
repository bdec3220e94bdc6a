use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

/// A cancellable background activity ticking on a fixed period.
///
/// Stopping is cooperative: a tick in flight runs to completion, no tick starts afterwards.
/// Dropping the task stops it as well.
pub(crate) struct PeriodicTask {
    name: &'static str,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn onto the current Tokio runtime. The first tick fires after `initial_delay`.
    pub fn spawn<F>(name: &'static str, initial_delay: Duration, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop, mut stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(
            async move {
                let mut interval = interval_at(Instant::now() + initial_delay, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;
                        // NOTE: Resolves on an explicit stop as well as on a dropped sender.
                        _ = &mut stopped => break,
                        _ = interval.tick() => tick(),
                    }
                }
                trace!("{name} stopped");
            }
            .in_current_span(),
        );

        Self {
            name,
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    /// Signal the task and wait for it to wind down. Calling this again is a no-op.
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                error!("Background task {} ended abnormally: {err}", self.name);
            }
        }
    }
}
