#![forbid(unsafe_code)]

//! Delayed execution for time-based operators.
//!
//! [`ThreadScheduler`] runs tasks on one dedicated timer thread.
//! [`ManualScheduler`] is a virtual clock for deterministic tests: nothing
//! runs until [`ManualScheduler::advance`] moves time forward.
//!
//! # Invariants
//!
//! 1. Tasks due at the same instant run in scheduling order.
//! 2. No task runs before its delay has elapsed.
//! 3. Tasks run without any scheduler lock held, so a task may schedule
//!    another task.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};
use web_time::{Duration, Instant};

use crate::lock;

/// A unit of delayed work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Runs tasks after a delay.
pub trait Scheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed.
    fn schedule_after(&self, delay: Duration, task: Task);
}

struct Timer<K> {
    due: K,
    seq: u64,
    task: Task,
}

impl<K: Ord> PartialEq for Timer<K> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<K: Ord> Eq for Timer<K> {}

impl<K: Ord> PartialOrd for Timer<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> Ord for Timer<K> {
    // Reversed: BinaryHeap is a max-heap and the earliest timer must pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Configuration for [`ThreadScheduler::spawn`].
#[derive(Debug, Clone)]
pub struct ThreadSchedulerConfig {
    /// Name given to the timer thread.
    pub thread_name: String,
}

impl Default for ThreadSchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: "ripple-timer".to_string(),
        }
    }
}

enum Command {
    Schedule(Duration, Task),
    Shutdown,
}

/// Scheduler backed by one timer thread.
///
/// Dropping the scheduler stops the thread; tasks not yet due are
/// discarded.
pub struct ThreadScheduler {
    tx: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadScheduler {
    /// Start the timer thread.
    pub fn spawn(config: ThreadSchedulerConfig) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || timer_loop(rx))?;
        debug!(thread = %config.thread_name, "timer thread started");
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }
}

fn timer_loop(rx: Receiver<Command>) {
    let mut timers: BinaryHeap<Timer<Instant>> = BinaryHeap::new();
    let mut seq = 0u64;
    loop {
        let now = Instant::now();
        while timers.peek().is_some_and(|t| t.due <= now) {
            if let Some(timer) = timers.pop() {
                (timer.task)();
            }
        }

        let command = match timers.peek() {
            Some(next) => match rx.recv_timeout(next.due.saturating_duration_since(Instant::now())) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => Command::Shutdown,
            },
            None => rx.recv().unwrap_or(Command::Shutdown),
        };

        match command {
            Command::Schedule(delay, task) => {
                seq += 1;
                timers.push(Timer {
                    due: Instant::now() + delay,
                    seq,
                    task,
                });
            }
            Command::Shutdown => {
                debug!(discarded = timers.len(), "timer thread stopping");
                return;
            }
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) {
        if self.tx.send(Command::Schedule(delay, task)).is_err() {
            warn!("timer thread gone; task dropped");
        }
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            // A task that drops the last handle runs on the timer thread itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl fmt::Debug for ThreadScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadScheduler").finish_non_exhaustive()
    }
}

struct ManualState {
    now: Duration,
    seq: u64,
    timers: BinaryHeap<Timer<Duration>>,
}

/// Virtual-time scheduler. Time only moves through [`advance`](Self::advance).
#[derive(Clone)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: Duration::ZERO,
                seq: 0,
                timers: BinaryHeap::new(),
            })),
        }
    }

    /// Virtual time elapsed since creation.
    #[must_use]
    pub fn now(&self) -> Duration {
        lock(&self.state).now
    }

    /// Tasks scheduled but not yet run.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.state).timers.len()
    }

    /// Move time forward by `by`, running every task that falls due, in due
    /// order. Tasks scheduled while advancing run too if they fall inside the
    /// window.
    pub fn advance(&self, by: Duration) {
        let target = lock(&self.state).now + by;
        loop {
            let task = {
                let mut state = lock(&self.state);
                match state.timers.peek() {
                    Some(next) if next.due <= target => {
                        let due = next.due;
                        state.now = state.now.max(due);
                        state.timers.pop().map(|t| t.task)
                    }
                    _ => {
                        state.now = target;
                        None
                    }
                }
            };
            match task {
                Some(task) => task(),
                None => break,
            }
        }
        trace!(now = ?target, "virtual clock advanced");
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("pending", &state.timers.len())
            .finish()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) {
        let mut state = lock(&self.state);
        state.seq += 1;
        let timer = Timer {
            due: state.now + delay,
            seq: state.seq,
            task,
        };
        state.timers.push(timer);
    }
}
