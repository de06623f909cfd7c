//! Registry events and the optional metadata-change capability
//!
//! Containers that can report in-place metadata changes implement
//! [`ObservableMetadata`]; the registry subscribes when a container is added
//! and unsubscribes when it is removed. Registry-level events fan out to
//! subscribers synchronously, in subscription order.

use crate::container::Container;
use parking_lot::Mutex;
use std::sync::Arc;

/// Listener invoked with the id of the container whose metadata changed
pub type MetadataListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Handle returned by [`ObservableMetadata::subscribe_metadata_changed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Optional capability: a container that notifies observers when its
/// metadata is mutated in place.
///
/// Not every container supports this; [`Container::as_observable`] returns
/// `None` for those that don't.
pub trait ObservableMetadata {
    fn subscribe_metadata_changed(&self, listener: MetadataListener) -> SubscriptionId;
    fn unsubscribe_metadata_changed(&self, id: SubscriptionId);
}

/// Events produced by the registry
#[derive(Clone)]
pub enum RegistryEvent {
    /// A container was registered (also emitted for the new identity of a rename)
    ContainerAdded(Arc<dyn Container>),
    /// A container was removed (also emitted for the old identity of a rename)
    ContainerRemoved(Arc<dyn Container>),
    /// A registered container reported an in-place metadata change
    MetadataChanged(String),
}

/// Synchronous fan-out bus for registry events
///
/// Subscribers are invoked in subscription order. There is no delivery
/// guarantee beyond that ordering.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Box<dyn Fn(&RegistryEvent) + Send + Sync>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.subscribers.lock().push(Box::new(subscriber));
    }

    pub fn emit(&self, event: &RegistryEvent) {
        for subscriber in self.subscribers.lock().iter() {
            subscriber(event);
        }
    }
}
