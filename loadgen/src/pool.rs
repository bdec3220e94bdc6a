use crate::worker::{WorkerError, WorkerUnit};
use crate::workload::Operation;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tokio::sync::oneshot::{self, error::TryRecvError};
#[allow(unused)]
use tracing::{debug, error, info, info_span, trace, warn};

/// Fixed set of OS threads, one per worker, each driving its worker to completion on a
/// single-threaded runtime.
///
/// Slot `i` belongs to worker `i` for the lifetime of the run; nothing is queued, stolen or
/// resubmitted. The pool accepts no work after [`WorkerPool::launch`].
pub(crate) struct WorkerPool<O: Operation> {
    slots: Vec<Slot<O>>,
    errors: Vec<WorkerError>,
}

struct Slot<O: Operation> {
    index: usize,
    receiver: Option<oneshot::Receiver<Finished<O>>>,
    completion: Completion,
    worker: Option<WorkerUnit<O>>,
}

struct Finished<O: Operation> {
    worker: WorkerUnit<O>,
    result: Result<u64, WorkerError>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Completion {
    Pending,
    Done(u64),
    Failed,
}

impl<O: Operation> WorkerPool<O> {
    pub fn launch(workers: Vec<WorkerUnit<O>>) -> Self {
        let parent = tracing::Span::current();
        let mut pool = Self {
            slots: Vec::with_capacity(workers.len()),
            errors: vec![],
        };

        for worker in workers {
            let index = worker.index();
            let (tx, rx) = oneshot::channel();
            // The worker is handed over only once its thread exists, so a failed spawn leaves it
            // here for its connections to be closed.
            let (handover, incoming) = oneshot::channel::<WorkerUnit<O>>();
            let span = info_span!(parent: &parent, "worker", index);

            let spawned = thread::Builder::new()
                .name(format!("loadgen-worker-{index}"))
                .spawn(move || {
                    let _entered = span.enter();
                    let Ok(mut worker) = incoming.blocking_recv() else {
                        return;
                    };
                    let result = run_to_completion(&mut worker);
                    // NOTE: The receiver is gone only when the orchestrator was dropped mid-run.
                    let _ = tx.send(Finished { worker, result });
                });

            let mut slot = Slot {
                index,
                receiver: Some(rx),
                completion: Completion::Pending,
                worker: None,
            };
            match spawned {
                Ok(_) => {
                    if let Err(worker) = handover.send(worker) {
                        worker.discard();
                        pool.fail(&mut slot, WorkerError::Lost(index));
                    }
                }
                Err(source) => {
                    worker.discard();
                    pool.fail(&mut slot, WorkerError::Spawn { index, source });
                }
            }
            pool.slots.push(slot);
        }

        pool
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Wait for every worker, then surface the first failure in worker order.
    pub async fn join(&mut self) -> Result<(), WorkerError> {
        for i in 0..self.slots.len() {
            let Some(receiver) = self.slots[i].receiver.take() else {
                continue;
            };

            let finished = receiver.await.ok();
            self.settle(i, finished);
        }

        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors.remove(0))
        }
    }

    /// Sum of all reported operation counts, or `None` while any worker is still running.
    /// Never blocks. Failed workers are left out of the sum.
    pub fn total_operations(&mut self) -> Option<u64> {
        for i in 0..self.slots.len() {
            if !self.poll(i) {
                return None;
            }
        }

        let mut total = 0;
        for slot in &self.slots {
            match slot.completion {
                Completion::Done(issued) => total += issued,
                Completion::Failed => warn!(
                    "Worker {} did not report a result; excluded from the total",
                    slot.index
                ),
                Completion::Pending => return None,
            }
        }
        Some(total)
    }

    /// Workers handed back by their threads. Empty until they have been joined or polled.
    pub fn finished_workers(&mut self) -> impl Iterator<Item = &mut WorkerUnit<O>> {
        self.slots.iter_mut().filter_map(|slot| slot.worker.as_mut())
    }

    fn poll(&mut self, i: usize) -> bool {
        let slot = &mut self.slots[i];
        let Some(receiver) = slot.receiver.as_mut() else {
            return true;
        };

        let finished = match receiver.try_recv() {
            Ok(finished) => Some(finished),
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Closed) => None,
        };
        slot.receiver = None;
        self.settle(i, finished);
        true
    }

    fn settle(&mut self, i: usize, finished: Option<Finished<O>>) {
        let mut slot = std::mem::replace(&mut self.slots[i], Slot::empty(i));
        match finished {
            Some(Finished { worker, result }) => {
                slot.worker = Some(worker);
                match result {
                    Ok(issued) => slot.completion = Completion::Done(issued),
                    Err(err) => self.fail(&mut slot, err),
                }
            }
            None => {
                let index = slot.index;
                self.fail(&mut slot, WorkerError::Lost(index));
            }
        }
        self.slots[i] = slot;
    }

    fn fail(&mut self, slot: &mut Slot<O>, err: WorkerError) {
        slot.completion = Completion::Failed;
        slot.receiver = None;
        self.errors.push(err);
    }
}

/// Drive `worker` on a fresh single-threaded runtime. A panic inside the run is reported as
/// [`WorkerError::Panicked`] and leaves the worker finished, with its connections still bound.
fn run_to_completion<O: Operation>(worker: &mut WorkerUnit<O>) -> Result<u64, WorkerError> {
    let index = worker.index();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| WorkerError::Runtime { index, source })?;

    match panic::catch_unwind(AssertUnwindSafe(|| runtime.block_on(worker.run()))) {
        Ok(result) => result,
        Err(payload) => {
            worker.mark_aborted();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!("Worker {index} panicked: {message}");
            Err(WorkerError::Panicked(index))
        }
    }
}

impl<O: Operation> Slot<O> {
    fn empty(index: usize) -> Self {
        Self {
            index,
            receiver: None,
            completion: Completion::Pending,
            worker: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::WorkerStats;
    use crate::worker::tests::{connection, RecordingOperation};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    fn workers(
        count: usize,
        run: Duration,
        fatal: Option<usize>,
    ) -> Vec<WorkerUnit<RecordingOperation>> {
        let closed = Arc::new(AtomicUsize::new(0));
        (0..count)
            .map(|index| {
                let operation = RecordingOperation {
                    fatal_after: (Some(index) == fatal).then_some(0),
                    ..Default::default()
                };
                let mut worker =
                    WorkerUnit::new(index, operation, run, Arc::new(WorkerStats::new(false)));
                worker.add_connection(connection(index, &closed));
                worker
            })
            .collect()
    }

    #[tokio::test]
    async fn join_collects_every_worker() {
        let mut pool = WorkerPool::launch(workers(3, Duration::from_millis(20), None));
        assert_eq!(pool.len(), 3);

        pool.join().await.unwrap();

        let total = pool.total_operations().unwrap();
        let issued: u64 = pool.finished_workers().map(|w| w.stats().issued()).sum();
        assert_eq!(total, issued);
        assert_eq!(pool.finished_workers().count(), 3);
    }

    #[tokio::test]
    async fn total_is_none_while_running() {
        let mut pool = WorkerPool::launch(workers(2, Duration::from_millis(300), None));

        assert_eq!(pool.total_operations(), None);

        pool.join().await.unwrap();
        assert!(pool.total_operations().unwrap() > 0);
    }

    #[tokio::test]
    async fn first_failure_surfaces_and_is_excluded() {
        let mut pool = WorkerPool::launch(workers(3, Duration::from_millis(20), Some(1)));

        let err = pool.join().await.unwrap_err();
        assert!(matches!(err, WorkerError::Fatal { index: 1, .. }));

        let total = pool.total_operations().unwrap();
        let healthy: u64 = pool
            .finished_workers()
            .filter(|w| w.index() != 1)
            .map(|w| w.stats().issued())
            .sum();
        assert_eq!(total, healthy);
        assert_eq!(pool.finished_workers().count(), 3);
    }

    #[tokio::test]
    async fn panicking_worker_keeps_its_connections_closable() {
        let closed = Arc::new(AtomicUsize::new(0));
        let operation = RecordingOperation {
            panic: true,
            ..Default::default()
        };
        let mut worker = WorkerUnit::new(
            0,
            operation,
            Duration::from_secs(60),
            Arc::new(WorkerStats::new(false)),
        );
        worker.add_connection(connection(0, &closed));
        worker.add_connection(connection(1, &closed));

        let mut pool = WorkerPool::launch(vec![worker]);
        let err = pool.join().await.unwrap_err();
        assert!(matches!(err, WorkerError::Panicked(0)));
        assert_eq!(pool.total_operations(), Some(0));

        let workers: Vec<_> = pool.finished_workers().collect();
        assert_eq!(workers.len(), 1);
        for worker in workers {
            worker.close_client_connections().unwrap();
        }
        assert_eq!(closed.load(std::sync::atomic::Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn workers_run_on_dedicated_threads() {
        struct ThreadName(Arc<std::sync::Mutex<Vec<String>>>);

        impl Operation for ThreadName {
            type Connection = crate::worker::tests::MockConnection;

            async fn perform(
                &mut self,
                _connection: &mut Self::Connection,
            ) -> Result<Option<Duration>, crate::OperationError> {
                let name = thread::current().name().unwrap_or_default().to_string();
                self.0.lock().unwrap().push(name);
                Ok(None)
            }
        }

        let names = Arc::new(std::sync::Mutex::new(vec![]));
        let closed = Arc::new(AtomicUsize::new(0));
        let workers = (0..2)
            .map(|index| {
                let mut worker = WorkerUnit::new(
                    index,
                    ThreadName(names.clone()),
                    Duration::ZERO,
                    Arc::new(WorkerStats::new(false)),
                );
                worker.add_connection(connection(index, &closed));
                worker
            })
            .collect();

        let mut pool = WorkerPool::launch(workers);
        pool.join().await.unwrap();

        let mut names = names.lock().unwrap().clone();
        names.sort();
        assert_eq!(names, ["loadgen-worker-0", "loadgen-worker-1"]);
    }
}
