//! User-editable instance containers

use super::{Container, ContainerKind, ContainerMetadata, SerializeError};
use crate::events::{MetadataListener, ObservableMetadata, SubscriptionId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::error;

/// Reserved id of the synthetic empty instance container
pub(crate) const EMPTY_CONTAINER_ID: &str = "empty";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InstanceState {
    id: String,
    name: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    values: HashMap<String, String>,
}

/// User-editable settings values
///
/// Tracks a dirty flag and supports the metadata-change notification
/// capability: mutating a metadata entry notifies subscribed listeners.
pub struct InstanceContainer {
    state: RwLock<InstanceState>,
    dirty: AtomicBool,
    listeners: Mutex<Vec<(SubscriptionId, MetadataListener)>>,
    next_subscription: AtomicU64,
}

impl InstanceContainer {
    pub fn new(id: &str, name: &str) -> Self {
        InstanceContainer {
            state: RwLock::new(InstanceState {
                id: id.to_string(),
                name: name.to_string(),
                metadata: HashMap::new(),
                values: HashMap::new(),
            }),
            dirty: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    /// Reconstruct an instance from its serialized form. The result is clean.
    pub fn from_serialized(data: &str) -> Result<Self, serde_json::Error> {
        let state: InstanceState = serde_json::from_str(data)?;
        Ok(InstanceContainer {
            state: RwLock::new(state),
            dirty: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        })
    }

    /// Set a metadata entry, marking the container dirty and notifying
    /// metadata-change listeners.
    pub fn set_metadata_entry(&self, key: &str, value: &str) {
        let id = {
            let mut state = self.state.write();
            state.metadata.insert(key.to_string(), value.to_string());
            state.id.clone()
        };
        self.dirty.store(true, Ordering::Relaxed);
        self.notify(&id);
    }

    pub fn set_value(&self, key: &str, value: &str) {
        self.state
            .write()
            .values
            .insert(key.to_string(), value.to_string());
        self.dirty.store(true, Ordering::Relaxed);
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.state.read().values.get(key).cloned()
    }

    fn notify(&self, id: &str) {
        let listeners: Vec<MetadataListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(id);
        }
    }
}

impl Container for InstanceContainer {
    fn id(&self) -> String {
        self.state.read().id.clone()
    }

    fn name(&self) -> String {
        self.state.read().name.clone()
    }

    fn set_name(&self, name: &str) {
        self.state.write().name = name.to_string();
        self.dirty.store(true, Ordering::Relaxed);
    }

    fn set_id(&self, id: &str) {
        self.state.write().id = id.to_string();
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Instance
    }

    fn metadata(&self) -> ContainerMetadata {
        let state = self.state.read();
        let mut meta = ContainerMetadata::new(ContainerKind::Instance, &state.id, &state.name);
        for (key, value) in &state.metadata {
            meta.fields.insert(key.clone(), value.clone());
        }
        meta
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Relaxed);
    }

    fn serialize(&self) -> Result<String, SerializeError> {
        serde_json::to_string_pretty(&*self.state.read())
            .map_err(|e| SerializeError::Failed(e.to_string()))
    }

    fn as_observable(&self) -> Option<&dyn ObservableMetadata> {
        Some(self)
    }
}

impl ObservableMetadata for InstanceContainer {
    fn subscribe_metadata_changed(&self, listener: MetadataListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    fn unsubscribe_metadata_changed(&self, id: SubscriptionId) {
        self.listeners.lock().retain(|(sub, _)| *sub != id);
    }
}

/// The reserved synthetic "empty" instance container
///
/// Always registered, read-only, never dirty. Stacks reference it for slots
/// that hold no values.
pub struct EmptyInstanceContainer;

impl Container for EmptyInstanceContainer {
    fn id(&self) -> String {
        EMPTY_CONTAINER_ID.to_string()
    }

    fn name(&self) -> String {
        EMPTY_CONTAINER_ID.to_string()
    }

    fn set_name(&self, name: &str) {
        error!("Refusing to rename the empty container to {}", name);
    }

    fn set_id(&self, id: &str) {
        error!("Refusing to re-key the empty container to {}", id);
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Instance
    }

    fn metadata(&self) -> ContainerMetadata {
        ContainerMetadata::new(ContainerKind::Instance, EMPTY_CONTAINER_ID, EMPTY_CONTAINER_ID)
    }

    fn serialize(&self) -> Result<String, SerializeError> {
        serde_json::to_string_pretty(&InstanceState {
            id: EMPTY_CONTAINER_ID.to_string(),
            name: EMPTY_CONTAINER_ID.to_string(),
            metadata: HashMap::new(),
            values: HashMap::new(),
        })
        .map_err(|e| SerializeError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_dirty_tracking() {
        let instance = InstanceContainer::new("profile_1", "Profile");
        assert!(!instance.is_dirty());

        instance.set_value("layer_height", "0.2");
        assert!(instance.is_dirty());

        instance.mark_clean();
        assert!(!instance.is_dirty());
    }

    #[test]
    fn test_metadata_change_notification() {
        let instance = InstanceContainer::new("profile_1", "Profile");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let observable = instance.as_observable().unwrap();
        let sink = Arc::clone(&seen);
        let subscription = observable
            .subscribe_metadata_changed(Arc::new(move |id| sink.lock().push(id.to_string())));

        instance.set_metadata_entry("material", "pla");
        assert_eq!(*seen.lock(), vec!["profile_1"]);

        observable.unsubscribe_metadata_changed(subscription);
        instance.set_metadata_entry("material", "abs");
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_instance_round_trip() {
        let instance = InstanceContainer::new("profile_1", "Profile");
        instance.set_value("layer_height", "0.2");
        instance.set_metadata_entry("material", "pla");

        let data = instance.serialize().unwrap();
        let back = InstanceContainer::from_serialized(&data).unwrap();

        assert_eq!(back.id(), "profile_1");
        assert_eq!(back.value("layer_height"), Some("0.2".to_string()));
        assert_eq!(back.metadata().get("material"), Some("pla"));
        assert!(!back.is_dirty());
    }

    #[test]
    fn test_empty_container_is_inert() {
        let empty = EmptyInstanceContainer;
        assert_eq!(empty.id(), "empty");
        assert!(!empty.is_dirty());
        assert!(empty.as_observable().is_none());

        empty.set_name("renamed");
        assert_eq!(empty.name(), "empty");
    }
}
