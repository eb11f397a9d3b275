//! Named, cancelable one-shot timers.
//!
//! Each timer is a sleeping task that posts a [`Fired`] notice back to the owner's
//! event loop. The owner must [`TimerRegistry::claim`] a notice before acting on it:
//! claiming only succeeds while the entry that produced the notice is still the live
//! one under that name, so canceled and replaced timers can never take effect even if
//! their notice was already queued.

use std::{collections::HashMap, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::trace;

/// Identifier distinguishing successive timers started under the same name.
pub type TimerId = u64;

/// Notice sent when a timer elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<T> {
    /// Name the timer was registered under.
    pub name: String,
    /// Identifier of the timer instance.
    pub id: TimerId,
    /// Payload given at start.
    pub payload: T,
}

/// A timer taken off the clock with its remaining time preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suspended<T> {
    /// Name the timer was registered under.
    pub name: String,
    /// Time left when it was suspended.
    pub remaining: Duration,
    /// Total duration at the original start.
    pub total: Duration,
    /// Payload given at start.
    pub payload: T,
}

#[derive(Debug)]
struct Entry<T> {
    id: TimerId,
    started_at: Instant,
    duration: Duration,
    total: Duration,
    payload: T,
    handle: JoinHandle<()>,
}

/// Registry of active timers keyed by name.
#[derive(Debug)]
pub struct TimerRegistry<T> {
    entries: HashMap<String, Entry<T>>,
    next_id: TimerId,
    sink: mpsc::UnboundedSender<Fired<T>>,
}

impl<T> TimerRegistry<T>
where
    T: Clone + Send + 'static,
{
    /// Create a registry and the receiver its notices are delivered on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Fired<T>>) {
        let (sink, rx) = mpsc::unbounded_channel();
        (
            Self {
                entries: HashMap::new(),
                next_id: 0,
                sink,
            },
            rx,
        )
    }

    /// Start `name`, replacing (and canceling) any timer already registered under it.
    pub fn start(&mut self, name: impl Into<String>, duration: Duration, payload: T) -> TimerId {
        self.start_entry(name.into(), duration, duration, payload)
    }

    /// Put a suspended timer back on the clock with its remaining time.
    pub fn resume(&mut self, suspended: Suspended<T>) -> TimerId {
        self.start_entry(
            suspended.name,
            suspended.remaining,
            suspended.total,
            suspended.payload,
        )
    }

    fn start_entry(&mut self, name: String, duration: Duration, total: Duration, payload: T) -> TimerId {
        self.cancel(&name);

        self.next_id += 1;
        let id = self.next_id;
        let notice = Fired {
            name: name.clone(),
            id,
            payload: payload.clone(),
        };
        let sink = self.sink.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // The owner may already be gone during shutdown.
            let _ = sink.send(notice);
        });

        trace!(timer = %name, id, ?duration, "timer started");
        self.entries.insert(
            name,
            Entry {
                id,
                started_at: Instant::now(),
                duration,
                total,
                payload,
                handle,
            },
        );
        id
    }

    /// Cancel `name`. Returns whether a timer was registered under it.
    pub fn cancel(&mut self, name: &str) -> bool {
        match self.entries.remove(name) {
            Some(entry) => {
                entry.handle.abort();
                trace!(timer = %name, id = entry.id, "timer canceled");
                true
            }
            None => false,
        }
    }

    /// Cancel every timer whose name satisfies `predicate`, returning their payloads.
    pub fn cancel_matching(&mut self, predicate: impl Fn(&str) -> bool) -> Vec<T> {
        let names: Vec<String> = self
            .entries
            .keys()
            .filter(|name| predicate(name))
            .cloned()
            .collect();
        names
            .into_iter()
            .filter_map(|name| {
                let entry = self.entries.remove(&name)?;
                entry.handle.abort();
                Some(entry.payload)
            })
            .collect()
    }

    /// Cancel every timer, returning their payloads.
    pub fn cancel_all(&mut self) -> Vec<T> {
        self.cancel_matching(|_| true)
    }

    /// Accept a notice if it comes from the live timer under its name, removing the
    /// entry. Stale notices return `false` and leave the registry untouched.
    pub fn claim(&mut self, fired: &Fired<T>) -> bool {
        match self.entries.get(&fired.name) {
            Some(entry) if entry.id == fired.id => {
                self.entries.remove(&fired.name);
                true
            }
            _ => false,
        }
    }

    /// Whether a timer is registered under `name`.
    pub fn is_active(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Time left on `name` as of `now`.
    pub fn remaining(&self, name: &str, now: Instant) -> Option<Duration> {
        self.entries.get(name).map(|entry| {
            entry
                .duration
                .saturating_sub(now.saturating_duration_since(entry.started_at))
        })
    }

    /// Full length of `name` as originally started.
    pub fn total(&self, name: &str) -> Option<Duration> {
        self.entries.get(name).map(|entry| entry.total)
    }

    /// Take `name` off the clock, keeping what is left of it.
    pub fn suspend(&mut self, name: &str, now: Instant) -> Option<Suspended<T>> {
        let remaining = self.remaining(name, now)?;
        let entry = self.entries.remove(name)?;
        entry.handle.abort();
        Some(Suspended {
            name: name.to_owned(),
            remaining,
            total: entry.total,
            payload: entry.payload,
        })
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no timer is live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Drop for TimerRegistry<T> {
    fn drop(&mut self) {
        for entry in self.entries.values() {
            entry.handle.abort();
        }
    }
}
