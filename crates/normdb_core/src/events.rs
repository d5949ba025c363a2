//! Change events for observing collection mutations.
//!
//! Every collection owns an [`EventBus`]. Records added to a collection
//! share the bus, so a field change made through any record handle
//! surfaces through the collection (bubbling), and listeners keep
//! receiving a record's events even after it leaves the collection.
//!
//! # Usage
//!
//! ```rust,ignore
//! let subscription = collection.subscribe();
//!
//! collection.add(payload)?;
//!
//! while let Ok(event) = subscription.try_recv() {
//!     println!("change: {:?}", event.kind);
//! }
//! ```

use crate::record::Record;
use normdb_value::Value;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Weak};

/// Type of change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A record entered the collection.
    Add,
    /// An existing record absorbed a merge or replace.
    Change,
    /// A single field was written through a record handle.
    FieldChange,
    /// A record left the collection.
    Remove,
}

/// A single change event.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Monotonic sequence number, per bus.
    pub sequence: u64,
    /// Type of change.
    pub kind: ChangeKind,
    /// The record the event originated from.
    pub record: Record,
    /// Field name for `FieldChange` events.
    pub field: Option<String>,
    /// New field value for `FieldChange` events.
    pub value: Option<Value>,
}

struct Subscriber {
    id: u64,
    tx: Sender<ChangeEvent>,
}

#[derive(Default)]
struct BusInner {
    subscribers: RwLock<Vec<Subscriber>>,
    next_subscriber: AtomicU64,
    sequence: AtomicU64,
}

/// A bus that distributes change events to subscribers.
///
/// The bus:
/// - Preserves emission order
/// - Supports multiple subscribers
/// - Prunes disconnected subscribers on emit
/// - Is cheap to clone (all clones share state)
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a new bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to the bus.
    ///
    /// The returned [`Subscription`] receives all future events and
    /// unsubscribes when cancelled or dropped.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst);
        self.inner.subscribers.write().push(Subscriber { id, tx });
        Subscription {
            id,
            receiver: rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Emits an event to all subscribers, returning its sequence number.
    pub fn emit(
        &self,
        kind: ChangeKind,
        record: Record,
        field: Option<String>,
        value: Option<Value>,
    ) -> u64 {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let event = ChangeEvent {
            sequence,
            kind,
            record,
            field,
            value,
        };

        let mut subscribers = self.inner.subscribers.write();
        subscribers.retain(|sub| sub.tx.send(event.clone()).is_ok());
        sequence
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Returns the latest emitted sequence number.
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.inner.sequence.load(Ordering::SeqCst)
    }
}

/// A live subscription to an [`EventBus`].
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    id: u64,
    receiver: Receiver<ChangeEvent>,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Receives the next pending event without blocking.
    ///
    /// # Errors
    ///
    /// Returns `TryRecvError::Empty` when no event is pending.
    pub fn try_recv(&self) -> Result<ChangeEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Cancels the subscription explicitly.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.subscribers.write().retain(|sub| sub.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record::new(Value::map(vec![("id".into(), Value::Number(1.0))]))
    }

    #[test]
    fn emit_and_receive() {
        let bus = EventBus::new();
        let sub = bus.subscribe();

        bus.emit(ChangeKind::Add, record(), None, None);

        let event = sub.try_recv().unwrap();
        assert_eq!(event.kind, ChangeKind::Add);
        assert_eq!(event.sequence, 1);
    }

    #[test]
    fn multiple_subscribers_see_every_event() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.emit(ChangeKind::Remove, record(), None, None);

        assert_eq!(first.try_recv().unwrap().kind, ChangeKind::Remove);
        assert_eq!(second.try_recv().unwrap().kind, ChangeKind::Remove);
    }

    #[test]
    fn sequence_is_monotonic() {
        let bus = EventBus::new();
        let sub = bus.subscribe();

        bus.emit(ChangeKind::Add, record(), None, None);
        bus.emit(ChangeKind::Change, record(), None, None);

        let events = sub.drain();
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[1].sequence, 2);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);
        // Pruned eagerly by the Drop impl, not lazily on emit.
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn field_change_carries_field_and_value() {
        let bus = EventBus::new();
        let sub = bus.subscribe();

        bus.emit(
            ChangeKind::FieldChange,
            record(),
            Some("age".into()),
            Some(Value::Number(30.0)),
        );

        let event = sub.try_recv().unwrap();
        assert_eq!(event.field.as_deref(), Some("age"));
        assert_eq!(event.value, Some(Value::Number(30.0)));
    }
}
