//! Clock and timer services used by appenders
//!
//! Appenders never sleep or block: they arm timers and react when they fire.
//! [`ThreadScheduler`] runs timers on one background thread against the wall
//! clock; [`ManualScheduler`] keeps virtual time that only moves when
//! [`ManualScheduler::advance`] is called, which makes every timing decision
//! of the engine reproducible in tests.

use chrono::Utc;
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Work to run when a timer fires.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Identifies an armed timer so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

pub trait Scheduler: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle;

    /// Cancelling a timer that already fired is a no-op.
    fn cancel(&self, handle: TimerHandle);
}

fn run_isolated(task: TimerTask) {
    if let Err(panic_info) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
        let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        tracing::error!(panic = %panic_msg, "timer task panicked");
    }
}

enum Command {
    Schedule {
        handle: TimerHandle,
        deadline: Instant,
        task: TimerTask,
    },
    Cancel(TimerHandle),
}

/// Fires timers on a dedicated background thread.
pub struct ThreadScheduler {
    sender: Option<Sender<Command>>,
    worker: Option<thread::JoinHandle<()>>,
    next_id: AtomicU64,
}

impl ThreadScheduler {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded::<Command>();

        let worker = thread::Builder::new()
            .name("log-timers".to_string())
            .spawn(move || {
                let mut pending: BTreeMap<(Instant, TimerHandle), TimerTask> = BTreeMap::new();
                let mut deadlines: HashMap<TimerHandle, Instant> = HashMap::new();

                loop {
                    let next_deadline = pending.keys().next().map(|(deadline, _)| *deadline);
                    let received = match next_deadline {
                        Some(deadline) => {
                            let wait = deadline.saturating_duration_since(Instant::now());
                            receiver.recv_timeout(wait)
                        }
                        None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };

                    match received {
                        Ok(Command::Schedule {
                            handle,
                            deadline,
                            task,
                        }) => {
                            deadlines.insert(handle, deadline);
                            pending.insert((deadline, handle), task);
                        }
                        Ok(Command::Cancel(handle)) => {
                            if let Some(deadline) = deadlines.remove(&handle) {
                                pending.remove(&(deadline, handle));
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let now = Instant::now();
                    while let Some(entry) = pending.first_entry() {
                        if entry.key().0 > now {
                            break;
                        }
                        let ((_, handle), task) = entry.remove_entry();
                        deadlines.remove(&handle);
                        run_isolated(task);
                    }
                }
            })
            .ok();

        if worker.is_none() {
            tracing::error!("failed to spawn timer thread; appender timers will not fire");
        }

        Self {
            sender: Some(sender),
            worker,
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadScheduler {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let handle = TimerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        // Far-future deadlines that overflow Instant are treated as "never".
        if let Some(deadline) = Instant::now().checked_add(delay) {
            if let Some(sender) = &self.sender {
                let _ = sender.send(Command::Schedule {
                    handle,
                    deadline,
                    task,
                });
            }
        }
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Command::Cancel(handle));
        }
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        // Closing the channel stops the worker; pending timers are discarded.
        drop(self.sender.take());

        if let Some(worker) = self.worker.take() {
            // The last reference can be released by a timer task on the worker itself.
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                tracing::error!("timer thread panicked during shutdown");
            }
        }
    }
}

struct ManualState {
    now_ms: i64,
    next_id: u64,
    pending: BTreeMap<(i64, TimerHandle), TimerTask>,
    deadlines: HashMap<TimerHandle, i64>,
}

/// Virtual time for deterministic tests and host-driven event loops.
///
/// # Example
///
/// ```
/// use rust_remote_logger::core::{ManualScheduler, Scheduler};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = ManualScheduler::new(0);
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&fired);
/// scheduler.schedule(Duration::from_millis(100), Box::new(move || flag.store(true, Ordering::SeqCst)));
///
/// scheduler.advance(Duration::from_millis(99));
/// assert!(!fired.load(Ordering::SeqCst));
/// scheduler.advance(Duration::from_millis(1));
/// assert!(fired.load(Ordering::SeqCst));
/// ```
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new(start_ms: i64) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now_ms: start_ms,
                next_id: 1,
                pending: BTreeMap::new(),
                deadlines: HashMap::new(),
            }),
        }
    }

    /// Move time forward, firing every timer that comes due, in deadline order.
    ///
    /// Tasks run without the internal lock held and may arm new timers; those
    /// fire within the same call when they fall inside the window.
    pub fn advance(&self, by: Duration) {
        let target = {
            let state = self.state.lock();
            state.now_ms.saturating_add(duration_ms(by))
        };

        loop {
            let task = {
                let mut state = self.state.lock();
                let due = match state.pending.first_entry() {
                    Some(entry) if entry.key().0 <= target => Some(entry.remove_entry()),
                    _ => None,
                };
                match due {
                    Some(((deadline, handle), task)) => {
                        state.deadlines.remove(&handle);
                        state.now_ms = state.now_ms.max(deadline);
                        task
                    }
                    None => {
                        state.now_ms = state.now_ms.max(target);
                        break;
                    }
                }
            };
            run_isolated(task);
        }
    }

    /// Number of armed timers.
    pub fn pending_timers(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl Scheduler for ManualScheduler {
    fn now_ms(&self) -> i64 {
        self.state.lock().now_ms
    }

    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let mut state = self.state.lock();
        let handle = TimerHandle(state.next_id);
        state.next_id += 1;
        let deadline = state.now_ms.saturating_add(duration_ms(delay));
        state.deadlines.insert(handle, deadline);
        state.pending.insert((deadline, handle), task);
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        let mut state = self.state.lock();
        if let Some(deadline) = state.deadlines.remove(&handle) {
            state.pending.remove(&(deadline, handle));
        }
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
