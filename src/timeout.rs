//! Cookie-based one-shot timers.
//!
//! Protocol state machines arm a timer per outstanding request and get back a
//! [`TimeoutCookie`]. Any message from the peer refreshes the timer, a final
//! answer removes it. Expired timers fire from [`TimeoutScheduler::run_once`],
//! which the engine calls on every tick.
//!
//! # Reentrancy
//!
//! Callbacks are invoked with the internal lock released, so a callback may
//! add, refresh or remove timers (including its own cookie, which is then a
//! no-op). Timers added while a pass is running are not considered until the
//! next pass, even if their deadline is already due.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::trace;

use crate::time::{duration_to_us, TimeSource};

/// Handle to an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeoutCookie(u64);

type TimeoutCallback = Box<dyn FnOnce(TimeoutCookie) + Send>;

struct TimerEntry {
    cookie: TimeoutCookie,
    deadline_us: u64,
    duration_us: u64,
    callback: TimeoutCallback,
}

#[derive(Default)]
struct TimerTable {
    entries: Vec<TimerEntry>,
    next_cookie: u64,
}

/// Set of pending one-shot timers driven by an injected [`TimeSource`].
pub struct TimeoutScheduler {
    time: Arc<dyn TimeSource>,
    table: Mutex<TimerTable>,
}

impl TimeoutScheduler {
    pub fn new(time: Arc<dyn TimeSource>) -> Self {
        Self {
            time,
            table: Mutex::new(TimerTable::default()),
        }
    }

    /// Time source the deadlines are measured against.
    pub fn time(&self) -> &Arc<dyn TimeSource> {
        &self.time
    }

    /// Arm a timer firing `callback` once `duration` has elapsed.
    pub fn add<F>(&self, callback: F, duration: Duration) -> TimeoutCookie
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_keyed(move |_| callback(), duration)
    }

    /// Like [`add`](Self::add), but the callback receives its own cookie.
    ///
    /// Lets the owner of a timer tell a stale expiry apart from the one it
    /// is currently waiting on.
    pub fn add_keyed<F>(&self, callback: F, duration: Duration) -> TimeoutCookie
    where
        F: FnOnce(TimeoutCookie) + Send + 'static,
    {
        let duration_us = duration_to_us(duration);
        let deadline_us = self.time.now_us().saturating_add(duration_us);

        let mut table = self.lock();
        let cookie = TimeoutCookie(table.next_cookie);
        table.next_cookie += 1;
        table.entries.push(TimerEntry {
            cookie,
            deadline_us,
            duration_us,
            callback: Box::new(callback),
        });
        cookie
    }

    /// Restart the timer's full duration from now.
    ///
    /// Unknown or already fired cookies are ignored.
    pub fn refresh(&self, cookie: TimeoutCookie) {
        let now_us = self.time.now_us();
        let mut table = self.lock();
        if let Some(entry) = table.entries.iter_mut().find(|e| e.cookie == cookie) {
            entry.deadline_us = now_us.saturating_add(entry.duration_us);
        }
    }

    /// Cancel a timer without firing it.
    pub fn remove(&self, cookie: TimeoutCookie) {
        self.lock().entries.retain(|e| e.cookie != cookie);
    }

    /// Fire every timer whose deadline has passed, earliest deadline first.
    pub fn run_once(&self) {
        let now_us = self.time.now_us();
        let horizon = self.lock().next_cookie;

        loop {
            let entry = {
                let mut table = self.lock();
                let due = table
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.cookie.0 < horizon && e.deadline_us <= now_us)
                    .min_by_key(|(_, e)| (e.deadline_us, e.cookie))
                    .map(|(index, _)| index);
                match due {
                    Some(index) => table.entries.remove(index),
                    None => break,
                }
            };

            trace!(cookie = entry.cookie.0, "timeout fired");
            (entry.callback)(entry.cookie);
        }
    }

    /// Whether `cookie` is still armed.
    pub fn contains(&self, cookie: TimeoutCookie) -> bool {
        self.lock().entries.iter().any(|e| e.cookie == cookie)
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, TimerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
