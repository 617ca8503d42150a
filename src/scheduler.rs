//! Batch scheduler
//!
//! Admitted tasks go into a FIFO queue shared by a fixed pool of worker
//! threads. Each worker runs one task end to end: it builds the task's
//! pipeline, runs it while forwarding progress, commits the output and
//! publishes the terminal event.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::Config;
use crate::error::{CleanerError, EnqueueError, Result};
use crate::processing::{PipelineBuilder, PipelineOutcome};
use crate::progress::{self, EventReceiver, ProgressReporter};
use crate::task::{RunningTask, TaskCell, TaskError, TaskId, TaskOptions, TaskSnapshot, TaskState};
use crate::writer::ResultWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Close admission and wait for every admitted task to finish.
    Graceful,
    /// Cancel every unfinished task, then wait for the workers.
    Cancel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Highest number of tasks observed running at the same time.
    pub peak_running: usize,
}

enum Finish {
    Succeeded,
    Failed(TaskError),
    Cancelled,
}

struct Inner {
    tasks: RwLock<BTreeMap<TaskId, Arc<TaskCell>>>,
    builder: PipelineBuilder,
    writer: ResultWriter,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl Inner {
    fn tasks(&self) -> RwLockReadGuard<'_, BTreeMap<TaskId, Arc<TaskCell>>> {
        self.tasks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn tasks_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<TaskId, Arc<TaskCell>>> {
        self.tasks.write().unwrap_or_else(|e| e.into_inner())
    }

    fn run_task(&self, cell: &Arc<TaskCell>, reporter: &ProgressReporter) {
        let Some(task) = cell.start() else {
            return;
        };

        let running = self.running.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_running.fetch_max(running, Ordering::AcqRel);

        info!("Task {} started: {}", task.id(), task.source_path().display());
        let start = Instant::now();

        let finish = panic::catch_unwind(AssertUnwindSafe(|| self.execute(&task, reporter)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                error!("Worker panicked while running task {}: {}", task.id(), message);
                Finish::Failed(TaskError { stage: "worker".to_string(), message })
            });

        let id = task.id();
        match finish {
            Finish::Succeeded => {
                let output_path = task.output_path().to_path_buf();
                task.succeed();
                self.succeeded.fetch_add(1, Ordering::AcqRel);
                info!("Task {} finished in {:.2?}: {}", id, start.elapsed(), output_path.display());
                reporter.succeeded(id, output_path);
            }
            Finish::Failed(err) => {
                warn!("Task {} failed in {}: {}", id, err.stage, err.message);
                task.fail(err.clone());
                self.failed.fetch_add(1, Ordering::AcqRel);
                reporter.failed(id, err);
            }
            Finish::Cancelled => {
                task.cancel();
                self.cancelled.fetch_add(1, Ordering::AcqRel);
                info!("Task {} cancelled", id);
                reporter.cancelled(id);
            }
        }

        self.running.fetch_sub(1, Ordering::AcqRel);
    }

    fn execute(&self, task: &RunningTask, reporter: &ProgressReporter) -> Finish {
        let pipeline = self.builder.build(task.options());
        debug!("Task {} ({}) pipeline: {:?}", task.id(), task.name(), pipeline.stage_names());

        let outcome = pipeline.run(task.source_path(), task.cancel_flag(), |value| {
            let value = task.report_progress(value);
            reporter.progress(task.id(), value);
        });

        match outcome {
            Ok(PipelineOutcome::Completed(encoded)) => match self.writer.commit(task.output_path(), &encoded) {
                Ok(()) => Finish::Succeeded,
                Err(e) => Finish::Failed(e.into()),
            },
            Ok(PipelineOutcome::Cancelled { stages_completed }) => {
                debug!("Task {} stopped after {} stage(s)", task.id(), stages_completed);
                Finish::Cancelled
            }
            Err(e) => Finish::Failed(e.into()),
        }
    }

    /// Finishes a task that never reached a worker.
    fn cancel_undispatched(&self, cell: &Arc<TaskCell>, reporter: &ProgressReporter) {
        if let Some(task) = cell.start() {
            let id = task.id();
            task.cancel();
            self.cancelled.fetch_add(1, Ordering::AcqRel);
            reporter.cancelled(id);
        }
    }
}

pub struct Scheduler {
    inner: Arc<Inner>,
    workers_wanted: usize,
    next_id: AtomicU64,
    admission: Mutex<Option<Sender<Arc<TaskCell>>>>,
    queue: Receiver<Arc<TaskCell>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    reporter: Mutex<Option<ProgressReporter>>,
}

impl Scheduler {
    /// Creates a stopped scheduler and the receiver for its task events.
    /// Tasks may be enqueued before [`Scheduler::start`]. Fails when the
    /// configuration does not validate.
    pub fn new(config: &Config) -> Result<(Self, EventReceiver)> {
        config.validate()?;
        let (reporter, events) = progress::channel(config.scheduler.event_capacity);
        let (admission, queue) = unbounded();

        let scheduler = Self {
            inner: Arc::new(Inner {
                tasks: RwLock::new(BTreeMap::new()),
                builder: PipelineBuilder::new(&config.processing),
                writer: ResultWriter::new(),
                running: AtomicUsize::new(0),
                peak_running: AtomicUsize::new(0),
                succeeded: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
                cancelled: AtomicUsize::new(0),
            }),
            workers_wanted: config.scheduler.workers,
            next_id: AtomicU64::new(1),
            admission: Mutex::new(Some(admission)),
            queue,
            workers: Mutex::new(Vec::new()),
            reporter: Mutex::new(Some(reporter)),
        };
        Ok((scheduler, events))
    }

    /// Spawns the worker pool. Calling it again is a no-op.
    pub fn start(&self) -> Result<()> {
        // Held across the spawn so shutdown joins whatever is started here.
        let mut workers = lock(&self.workers);
        if !workers.is_empty() {
            return Ok(());
        }
        if lock(&self.admission).is_none() {
            return Err(CleanerError::startup("Scheduler has already been shut down"));
        }
        let reporter = match lock(&self.reporter).as_ref() {
            Some(reporter) => reporter.clone(),
            None => return Err(CleanerError::startup("Scheduler has already been shut down")),
        };

        for index in 0..self.workers_wanted {
            let inner = Arc::clone(&self.inner);
            let queue = self.queue.clone();
            let reporter = reporter.clone();
            let spawned = thread::Builder::new()
                .name(format!("cleaner-worker-{}", index))
                .spawn(move || {
                    while let Ok(cell) = queue.recv() {
                        inner.run_task(&cell, &reporter);
                    }
                });

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => error!("Failed to spawn worker {}: {}", index, e),
            }
        }

        if workers.is_empty() {
            return Err(CleanerError::startup(format!(
                "Could not start any of {} worker threads", self.workers_wanted
            )));
        }
        if workers.len() < self.workers_wanted {
            warn!("Started {} of {} workers", workers.len(), self.workers_wanted);
        }
        info!("Scheduler started with {} workers", workers.len());
        Ok(())
    }

    /// Admits a task. The source is not opened until a worker runs it.
    pub fn enqueue<P: Into<PathBuf>>(&self, source_path: P, options: TaskOptions) -> std::result::Result<TaskId, EnqueueError> {
        let source_path = source_path.into();
        if source_path.as_os_str().is_empty() {
            return Err(EnqueueError::EmptyPath);
        }

        let admission = lock(&self.admission);
        let sender = admission.as_ref().ok_or(EnqueueError::Closed)?;

        let id = TaskId(self.next_id.fetch_add(1, Ordering::AcqRel));
        let cell = Arc::new(TaskCell::new(id, source_path, options));
        self.inner.tasks_mut().insert(id, Arc::clone(&cell));
        sender.send(cell).map_err(|_| EnqueueError::Closed)?;

        debug!("Task {} enqueued", id);
        Ok(id)
    }

    /// Requests cancellation. Already finished tasks are left as they are.
    pub fn cancel(&self, id: TaskId) -> Result<()> {
        let cell = self.cell(id)?;
        if cell.request_cancel() {
            debug!("Cancel requested for task {}", id);
        }
        Ok(())
    }

    /// Requests cancellation of every unfinished task; returns how many.
    pub fn cancel_all(&self) -> usize {
        self.inner.tasks().values().filter(|cell| cell.request_cancel()).count()
    }

    /// Re-enqueues a failed or cancelled task as a new task.
    pub fn retry(&self, id: TaskId) -> Result<TaskId> {
        let cell = self.cell(id)?;
        match cell.state() {
            TaskState::Failed | TaskState::Cancelled => {
                Ok(self.enqueue(cell.source_path().to_path_buf(), cell.options().clone())?)
            }
            TaskState::Pending | TaskState::Running => Err(CleanerError::TaskActive { id: id.value() }),
            state => Err(CleanerError::NotRetryable { id: id.value(), state: state.to_string() }),
        }
    }

    /// Removes a finished task from the list.
    pub fn clear(&self, id: TaskId) -> Result<TaskSnapshot> {
        let mut tasks = self.inner.tasks_mut();
        let cell = tasks.get(&id).ok_or(CleanerError::UnknownTask { id: id.value() })?;
        if !cell.state().is_terminal() {
            return Err(CleanerError::TaskActive { id: id.value() });
        }
        let snapshot = cell.snapshot();
        tasks.remove(&id);
        Ok(snapshot)
    }

    /// Removes every finished task; returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        let mut tasks = self.inner.tasks_mut();
        let before = tasks.len();
        tasks.retain(|_, cell| !cell.state().is_terminal());
        before - tasks.len()
    }

    pub fn snapshot(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.inner.tasks().get(&id).map(|cell| cell.snapshot())
    }

    /// Every known task in admission order.
    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.inner.tasks().values().map(|cell| cell.snapshot()).collect()
    }

    /// Tasks that are still pending or running.
    pub fn active_count(&self) -> usize {
        self.inner.tasks().values().filter(|cell| !cell.state().is_terminal()).count()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            succeeded: self.inner.succeeded.load(Ordering::Acquire),
            failed: self.inner.failed.load(Ordering::Acquire),
            cancelled: self.inner.cancelled.load(Ordering::Acquire),
            peak_running: self.inner.peak_running.load(Ordering::Acquire),
        }
    }

    pub fn worker_count(&self) -> usize {
        lock(&self.workers).len()
    }

    /// Stops admission and joins every worker. Once it returns all admitted
    /// tasks are terminal and the event receiver drains to closure.
    pub fn shutdown(&self, mode: ShutdownMode) -> SchedulerStats {
        // Dropping the sender lets workers exit once the queue is empty.
        let was_open = lock(&self.admission).take().is_some();

        if mode == ShutdownMode::Cancel {
            let cancelled = self.cancel_all();
            if cancelled > 0 {
                info!("Cancelling {} unfinished task(s)", cancelled);
            }
        }

        let workers = std::mem::take(&mut *lock(&self.workers));
        for handle in workers {
            if handle.join().is_err() {
                error!("Worker thread terminated abnormally");
            }
        }

        if let Some(reporter) = lock(&self.reporter).take() {
            // Without workers nothing would ever run what is left in the queue.
            for cell in self.queue.try_iter() {
                self.inner.cancel_undispatched(&cell, &reporter);
            }
        }

        let stats = self.stats();
        if was_open {
            info!(
                "Scheduler stopped: {} succeeded, {} failed, {} cancelled",
                stats.succeeded, stats.failed, stats.cancelled
            );
        }
        stats
    }

    fn cell(&self, id: TaskId) -> Result<Arc<TaskCell>> {
        self.inner
            .tasks()
            .get(&id)
            .cloned()
            .ok_or(CleanerError::UnknownTask { id: id.value() })
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown(ShutdownMode::Cancel);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
