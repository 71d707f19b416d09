//! Repository events for observers.
//!
//! Repositories publish one event per completed call, after the engine has
//! committed (or rejected) the write. Analytics and monitoring hook in as
//! observers or channel subscribers and never touch the engine.
//!
//! ```rust,ignore
//! let bus = EventBus::new();
//! let events = bus.subscribe();
//! std::thread::spawn(move || {
//!     while let Ok(event) = events.recv() {
//!         println!("{:?} on {}", event.operation, event.collection);
//!     }
//! });
//! ```

use crate::types::now_iso;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Default number of events kept for [`EventBus::recent`].
pub const DEFAULT_HISTORY: usize = 256;

/// Repository call that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `create`.
    Create,
    /// `update` or `update_with`.
    Update,
    /// `delete`.
    Delete,
    /// `batch_create`.
    BatchCreate,
    /// `batch_update`.
    BatchUpdate,
    /// `batch_delete`.
    BatchDelete,
}

impl Operation {
    /// Returns the operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::BatchCreate => "batch_create",
            Self::BatchUpdate => "batch_update",
            Self::BatchDelete => "batch_delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the call succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The write was committed.
    Success,
    /// The call failed with this message.
    Failure(String),
}

impl Outcome {
    /// Returns true on success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// A completed repository call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEvent {
    /// Collection written.
    pub collection: String,
    /// What was attempted.
    pub operation: Operation,
    /// Ids affected. Empty when the failure happened before an id existed.
    pub ids: Vec<String>,
    /// Success or failure.
    pub outcome: Outcome,
    /// ISO-8601 time the event was published.
    pub at: String,
}

impl RepositoryEvent {
    /// Creates a success event.
    pub fn success(collection: impl Into<String>, operation: Operation, ids: Vec<String>) -> Self {
        Self {
            collection: collection.into(),
            operation,
            ids,
            outcome: Outcome::Success,
            at: now_iso(),
        }
    }

    /// Creates a failure event.
    pub fn failure(
        collection: impl Into<String>,
        operation: Operation,
        ids: Vec<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            operation,
            ids,
            outcome: Outcome::Failure(message.into()),
            at: now_iso(),
        }
    }
}

/// Receives repository events synchronously, on the calling thread.
///
/// Observers must not call back into the repository that published the
/// event.
pub trait RepositoryObserver: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &RepositoryEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RepositoryObserver for TracingObserver {
    fn on_event(&self, event: &RepositoryEvent) {
        match &event.outcome {
            Outcome::Success => tracing::debug!(
                collection = %event.collection,
                operation = %event.operation,
                ids = event.ids.len(),
                "repository write"
            ),
            Outcome::Failure(message) => tracing::warn!(
                collection = %event.collection,
                operation = %event.operation,
                error = %message,
                "repository write failed"
            ),
        }
    }
}

struct Inner {
    observers: RwLock<Vec<Arc<dyn RepositoryObserver>>>,
    subscribers: Mutex<Vec<Sender<RepositoryEvent>>>,
    history: Mutex<VecDeque<RepositoryEvent>>,
    max_history: usize,
}

/// Fans repository events out to observers and channel subscribers.
///
/// Cloning is cheap; clones share observers, subscribers and history.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a bus keeping the last [`DEFAULT_HISTORY`] events.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_history(DEFAULT_HISTORY)
    }

    /// Creates a bus keeping the last `max_history` events.
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                observers: RwLock::new(Vec::new()),
                subscribers: Mutex::new(Vec::new()),
                history: Mutex::new(VecDeque::new()),
                max_history,
            }),
        }
    }

    /// Registers an observer.
    pub fn add_observer(&self, observer: Arc<dyn RepositoryObserver>) {
        self.inner.observers.write().push(observer);
    }

    /// Returns a receiver for every event published from now on.
    ///
    /// Dropped receivers are forgotten on the next publish.
    pub fn subscribe(&self) -> Receiver<RepositoryEvent> {
        let (tx, rx) = mpsc::channel();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Publishes an event.
    pub fn publish(&self, event: RepositoryEvent) {
        {
            let mut history = self.inner.history.lock();
            history.push_back(event.clone());
            while history.len() > self.inner.max_history {
                history.pop_front();
            }
        }

        for observer in self.inner.observers.read().iter() {
            observer.on_event(&event);
        }

        self.inner
            .subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the retained events, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<RepositoryEvent> {
        self.inner.history.lock().iter().cloned().collect()
    }

    /// Returns the number of live channel subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Returns the number of observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.observers.read().len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observer_count())
            .field("subscribers", &self.subscriber_count())
            .field("max_history", &self.inner.max_history)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        failures: AtomicUsize,
        total: AtomicUsize,
    }

    impl RepositoryObserver for Counter {
        fn on_event(&self, event: &RepositoryEvent) {
            self.total.fetch_add(1, Ordering::SeqCst);
            if !event.outcome.is_success() {
                self.failures.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn observers_see_every_event() {
        let bus = EventBus::new();
        let counter = Arc::new(Counter::default());
        bus.add_observer(counter.clone());

        bus.publish(RepositoryEvent::success("users", Operation::Create, vec!["u1".into()]));
        bus.publish(RepositoryEvent::failure("users", Operation::Create, vec![], "duplicate"));

        assert_eq!(counter.total.load(Ordering::SeqCst), 2);
        assert_eq!(counter.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribers_receive_in_order() {
        let bus = EventBus::new();
        let rx = bus.subscribe();

        bus.publish(RepositoryEvent::success("users", Operation::Create, vec!["a".into()]));
        bus.publish(RepositoryEvent::success("users", Operation::Delete, vec!["a".into()]));

        assert_eq!(rx.recv().unwrap().operation, Operation::Create);
        assert_eq!(rx.recv().unwrap().operation, Operation::Delete);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let _kept = bus.subscribe();
        drop(rx);

        bus.publish(RepositoryEvent::success("lessons", Operation::Update, vec![]));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let bus = EventBus::with_max_history(2);
        for id in ["a", "b", "c"] {
            bus.publish(RepositoryEvent::success("users", Operation::Create, vec![id.into()]));
        }

        let recent = bus.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].ids, vec!["b".to_string()]);
        assert_eq!(recent[1].ids, vec!["c".to_string()]);
    }

    #[test]
    fn clones_share_state() {
        let bus = EventBus::new();
        let clone = bus.clone();
        clone.publish(RepositoryEvent::success("users", Operation::Create, vec![]));
        assert_eq!(bus.recent().len(), 1);
    }
}
