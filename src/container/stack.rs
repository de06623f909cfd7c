//! Container stacks

use super::{Container, ContainerKind, ContainerMetadata, SerializeError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StackState {
    id: String,
    name: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    /// Ordered container ids, top of the inheritance chain first
    #[serde(default)]
    containers: Vec<String>,
}

/// Ordered composition of containers forming an inheritance chain
///
/// A stack holds container ids, not the objects themselves; resolving an id
/// back to a container goes through the registry.
pub struct ContainerStack {
    state: RwLock<StackState>,
    dirty: AtomicBool,
}

impl ContainerStack {
    pub fn new(id: &str, name: &str) -> Self {
        ContainerStack {
            state: RwLock::new(StackState {
                id: id.to_string(),
                name: name.to_string(),
                metadata: HashMap::new(),
                containers: Vec::new(),
            }),
            dirty: AtomicBool::new(false),
        }
    }

    /// Reconstruct a stack from its serialized form. The result is clean.
    pub fn from_serialized(data: &str) -> Result<Self, serde_json::Error> {
        let state: StackState = serde_json::from_str(data)?;
        Ok(ContainerStack {
            state: RwLock::new(state),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn push_container(&self, container_id: &str) {
        self.state.write().containers.push(container_id.to_string());
        self.dirty.store(true, Ordering::Relaxed);
    }

    pub fn container_ids(&self) -> Vec<String> {
        self.state.read().containers.clone()
    }

    pub fn set_metadata_entry(&self, key: &str, value: &str) {
        self.state
            .write()
            .metadata
            .insert(key.to_string(), value.to_string());
        self.dirty.store(true, Ordering::Relaxed);
    }
}

impl Container for ContainerStack {
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
        ContainerKind::Stack
    }

    fn metadata(&self) -> ContainerMetadata {
        let state = self.state.read();
        let mut meta = ContainerMetadata::new(ContainerKind::Stack, &state.id, &state.name);
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_ordering_preserved() {
        let stack = ContainerStack::new("extruder_0", "Extruder 1");
        stack.push_container("quality_profile");
        stack.push_container("material_pla");
        stack.push_container("fdmprinter");

        assert_eq!(
            stack.container_ids(),
            vec!["quality_profile", "material_pla", "fdmprinter"]
        );
    }

    #[test]
    fn test_stack_round_trip() {
        let stack = ContainerStack::new("extruder_0", "Extruder 1");
        stack.push_container("material_pla");
        stack.set_metadata_entry("position", "0");

        let data = stack.serialize().unwrap();
        let back = ContainerStack::from_serialized(&data).unwrap();

        assert_eq!(back.id(), "extruder_0");
        assert_eq!(back.container_ids(), vec!["material_pla"]);
        assert_eq!(back.metadata().get("position"), Some("0"));
        assert!(!back.is_dirty());
    }

    #[test]
    fn test_stack_dirty_on_mutation() {
        let stack = ContainerStack::new("stack", "Stack");
        assert!(!stack.is_dirty());
        stack.push_container("empty");
        assert!(stack.is_dirty());
    }
}
