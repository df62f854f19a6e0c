//! Append-only published records with topic-keyed fan-out.
//!
//! A [`WorkQueue`](crate::queue::WorkQueue) is a transient conveyor between
//! stages; an [`ObservableSequence`] is the durable, plottable record of what
//! a stage produced. Every append synchronously notifies the subscribers in
//! the order they subscribed.

use crate::error::Result;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Receives `(topic, value)` notifications from observable sequences
pub trait Observer<T>: Send + Sync {
    /// Called once per appended value.
    ///
    /// Returning an error is logged and counted by the sequence; it never
    /// reaches the appending stage.
    fn on_publish(&self, topic: &str, value: &T) -> Result<()>;
}

impl<T, F> Observer<T> for F
where
    F: Fn(&str, &T) -> Result<()> + Send + Sync,
{
    fn on_publish(&self, topic: &str, value: &T) -> Result<()> {
        self(topic, value)
    }
}

struct Subscription<T> {
    topic: String,
    observer: Arc<dyn Observer<T>>,
}

/// Ordered, append-only sequence that fans every value out to its observers.
///
/// Exactly one stage appends; any number of readers may subscribe or read.
/// Observers must not append to or subscribe on the sequence that is
/// notifying them. Every read accessor is safe to call from an observer.
pub struct ObservableSequence<T> {
    values: RwLock<Vec<T>>,
    subscribers: RwLock<Vec<Subscription<T>>>,
    subscriber_count: AtomicUsize,
    observer_failures: AtomicU64,
}

impl<T> Default for ObservableSequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ObservableSequence<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableSequence")
            .field("len", &self.values.read().len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<T> ObservableSequence<T> {
    /// Create an empty sequence with no subscribers
    pub fn new() -> Self {
        Self {
            values: RwLock::new(Vec::new()),
            subscribers: RwLock::new(Vec::new()),
            subscriber_count: AtomicUsize::new(0),
            observer_failures: AtomicU64::new(0),
        }
    }

    /// Register `observer` to be notified under `topic`
    pub fn subscribe(&self, observer: Arc<dyn Observer<T>>, topic: impl Into<String>) {
        let mut subscribers = self.subscribers.write();
        subscribers.push(Subscription {
            topic: topic.into(),
            observer,
        });
        self.subscriber_count.store(subscribers.len(), Ordering::Release);
    }

    /// Append a value and notify every subscriber.
    ///
    /// The subscriber list is held for the whole append, so a concurrent
    /// `subscribe` sees either none or all of this notification round.
    pub fn append(&self, value: T) {
        let subscribers = self.subscribers.read();
        let index = {
            let mut values = self.values.write();
            values.push(value);
            values.len() - 1
        };

        if subscribers.is_empty() {
            return;
        }

        let values = self.values.read();
        let value = &values[index];
        for subscription in subscribers.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                subscription.observer.on_publish(&subscription.topic, value)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.observer_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(topic = %subscription.topic, error = %e, "observer failed");
                }
                Err(_) => {
                    self.observer_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(topic = %subscription.topic, "observer panicked");
                }
            }
        }
    }

    /// Number of values appended so far
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Check if nothing has been appended yet
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Number of registered subscriptions.
    ///
    /// Lock-free, so an observer may call it while a `subscribe` on another
    /// thread is waiting for the notification round to end.
    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::Acquire)
    }

    /// Number of notifications that returned an error or panicked
    pub fn observer_failures(&self) -> u64 {
        self.observer_failures.load(Ordering::Relaxed)
    }
}

impl<T: Clone> ObservableSequence<T> {
    /// Get the value at `index`, in append order
    pub fn get(&self, index: usize) -> Option<T> {
        self.values.read().get(index).cloned()
    }

    /// Copy of every value appended so far
    pub fn snapshot(&self) -> Vec<T> {
        self.values.read().clone()
    }

    /// Most recently appended value
    pub fn last(&self) -> Option<T> {
        self.values.read().last().cloned()
    }
}
