// src/scheduler/timers.rs
//! Single-shot and periodic callbacks served by one background thread.
//!
//! Callbacks run on the timer thread with the table unlocked, so they may
//! start, stop or restart timers themselves. Keep them short: a slow
//! callback delays every other timer.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

pub type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Once,
    Every(Duration),
}

struct Entry {
    /// `None` once a single-shot timer has fired or the timer was stopped.
    due: Option<Instant>,
    repeat: Repeat,
    callback: Callback,
}

/// `None` when `delay` reaches past what an `Instant` can hold.
fn deadline(from: Instant, delay: Duration) -> Option<Instant> {
    let due = from.checked_add(delay);
    if due.is_none() {
        warn!(?delay, "timer delay out of range, leaving timer disarmed");
    }
    due
}

#[derive(Default)]
struct Table {
    entries: HashMap<TimerId, Entry>,
    next_id: u64,
    shutdown: bool,
}

#[derive(Default)]
struct Inner {
    table: Mutex<Table>,
    wake: Condvar,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cloneable access to the timer table.
#[derive(Clone)]
pub struct TimerHandle {
    inner: Arc<Inner>,
}

impl TimerHandle {
    /// Arm a new timer. The first call happens after `delay`.
    pub fn start<F>(&self, delay: Duration, repeat: Repeat, callback: F) -> TimerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut table = self.inner.lock();
        let id = TimerId(table.next_id);
        table.next_id += 1;
        table.entries.insert(
            id,
            Entry {
                due: deadline(Instant::now(), delay),
                repeat,
                callback: Arc::new(callback),
            },
        );
        self.inner.wake.notify_one();
        id
    }

    /// Disarm a timer; it can be armed again with [`restart`](Self::restart).
    pub fn stop(&self, id: TimerId) -> bool {
        match self.inner.lock().entries.get_mut(&id) {
            Some(entry) => entry.due.take().is_some(),
            None => false,
        }
    }

    /// Re-arm a timer to fire after `delay`, whether or not it is armed now.
    pub fn restart(&self, id: TimerId, delay: Duration) -> bool {
        let mut table = self.inner.lock();
        let Some(entry) = table.entries.get_mut(&id) else {
            return false;
        };
        entry.due = deadline(Instant::now(), delay);
        self.inner.wake.notify_one();
        true
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.inner
            .lock()
            .entries
            .get(&id)
            .is_some_and(|entry| entry.due.is_some())
    }
}

/// Owns the timer thread. Dropping it cancels every timer.
pub struct Timers {
    handle: TimerHandle,
    thread: Option<JoinHandle<()>>,
}

impl Timers {
    pub fn new() -> Self {
        let inner = Arc::new(Inner::default());
        let worker = inner.clone();
        let thread = thread::Builder::new()
            .name("vissy-timers".into())
            .spawn(move || run(&worker))
            .map_err(|e| error!("failed to start timer thread: {e}"))
            .ok();
        Self {
            handle: TimerHandle { inner },
            thread,
        }
    }

    pub fn handle(&self) -> TimerHandle {
        self.handle.clone()
    }

    pub fn start<F>(&self, delay: Duration, repeat: Repeat, callback: F) -> TimerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.handle.start(delay, repeat, callback)
    }

    pub fn stop(&self, id: TimerId) -> bool {
        self.handle.stop(id)
    }

    pub fn restart(&self, id: TimerId, delay: Duration) -> bool {
        self.handle.restart(id, delay)
    }

    /// Cancel all timers and wait for the thread. A callback that is already
    /// running is allowed to finish.
    pub fn shutdown(&mut self) {
        {
            let mut table = self.handle.inner.lock();
            table.shutdown = true;
            table.entries.clear();
        }
        self.handle.inner.wake.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            debug!("timer thread stopped");
        }
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(inner: &Inner) {
    let mut table = inner.lock();
    loop {
        if table.shutdown {
            return;
        }

        let now = Instant::now();
        let mut fire = Vec::new();
        for entry in table.entries.values_mut() {
            let Some(due) = entry.due else { continue };
            if due > now {
                continue;
            }
            entry.due = match entry.repeat {
                Repeat::Once => None,
                Repeat::Every(period) => match deadline(due, period) {
                    // skip missed periods instead of firing a burst
                    Some(next) if next <= now => deadline(now, period),
                    next => next,
                },
            };
            fire.push(entry.callback.clone());
        }

        if !fire.is_empty() {
            drop(table);
            trace!(count = fire.len(), "timers fired");
            for callback in fire {
                callback();
            }
            table = inner.lock();
            continue;
        }

        let next = table.entries.values().filter_map(|e| e.due).min();
        table = match next {
            Some(due) => {
                inner
                    .wake
                    .wait_timeout(table, due.saturating_duration_since(now))
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .0
            }
            None => inner
                .wake
                .wait(table)
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        };
    }
}
