//! Task event channel between workers and the observer
//!
//! Sending never blocks. The queue has a soft capacity: once it is reached a
//! new `Progress` event replaces the oldest queued `Progress` event of the same
//! task. Terminal events are always queued, even past the capacity.
//!
//! Eviction has to reach into the queued events, which a channel does not
//! allow, so the queue is a `VecDeque` under a mutex with a condvar for
//! blocking receives.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::task::{TaskError, TaskId};

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Progress(f32),
    Succeeded { output_path: PathBuf },
    Failed(TaskError),
    Cancelled,
}

impl EventKind {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventKind::Progress(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub kind: EventKind,
}

struct State {
    queue: VecDeque<TaskEvent>,
    senders: usize,
    receiver_alive: bool,
    dropped: u64,
}

struct Shared {
    state: Mutex<State>,
    available: Condvar,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave the queue half-updated.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Creates a connected reporter/receiver pair.
pub fn channel(capacity: usize) -> (ProgressReporter, EventReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::new(),
            senders: 1,
            receiver_alive: true,
            dropped: 0,
        }),
        available: Condvar::new(),
        capacity: capacity.max(1),
    });
    (ProgressReporter { shared: shared.clone() }, EventReceiver { shared })
}

/// Sending half, cloned into every worker.
pub struct ProgressReporter {
    shared: Arc<Shared>,
}

impl ProgressReporter {
    pub fn send(&self, event: TaskEvent) {
        let mut state = self.shared.lock();
        if !state.receiver_alive {
            return;
        }

        if !event.kind.is_terminal() && state.queue.len() >= self.shared.capacity {
            let oldest = state
                .queue
                .iter()
                .position(|e| e.task_id == event.task_id && !e.kind.is_terminal());
            if let Some(index) = oldest {
                state.queue.remove(index);
                state.dropped += 1;
            }
        }

        state.queue.push_back(event);
        drop(state);
        self.shared.available.notify_one();
    }

    pub fn progress(&self, task_id: TaskId, value: f32) {
        self.send(TaskEvent { task_id, kind: EventKind::Progress(value) });
    }

    pub fn succeeded(&self, task_id: TaskId, output_path: PathBuf) {
        self.send(TaskEvent { task_id, kind: EventKind::Succeeded { output_path } });
    }

    pub fn failed(&self, task_id: TaskId, error: TaskError) {
        self.send(TaskEvent { task_id, kind: EventKind::Failed(error) });
    }

    pub fn cancelled(&self, task_id: TaskId) {
        self.send(TaskEvent { task_id, kind: EventKind::Cancelled });
    }
}

impl Clone for ProgressReporter {
    fn clone(&self) -> Self {
        self.shared.lock().senders += 1;
        Self { shared: self.shared.clone() }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.senders -= 1;
        if state.senders == 0 {
            drop(state);
            self.shared.available.notify_all();
        }
    }
}

/// Receiving half. Events of one task arrive in the order they were sent.
pub struct EventReceiver {
    shared: Arc<Shared>,
}

impl EventReceiver {
    /// Blocks until an event arrives; `None` once every reporter is gone and
    /// the queue is drained.
    pub fn recv(&self) -> Option<TaskEvent> {
        let mut state = self.shared.lock();
        loop {
            if let Some(event) = state.queue.pop_front() {
                return Some(event);
            }
            if state.senders == 0 {
                return None;
            }
            state = self.shared.available.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    pub fn try_recv(&self) -> Option<TaskEvent> {
        self.shared.lock().queue.pop_front()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<TaskEvent> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if let Some(event) = state.queue.pop_front() {
                return Some(event);
            }
            let now = Instant::now();
            if state.senders == 0 || now >= deadline {
                return None;
            }
            state = self
                .shared
                .available
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = TaskEvent> + '_ {
        std::iter::from_fn(move || self.recv())
    }

    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Progress events replaced because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.receiver_alive = false;
        state.queue.clear();
    }
}
