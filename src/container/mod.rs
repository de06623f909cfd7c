//! Container model
//!
//! A container is a uniquely identified, named, versioned bundle of settings.
//! Three kinds exist: definitions (read-mostly templates), instances
//! (user-editable values) and stacks (ordered compositions forming an
//! inheritance chain). Every container carries cheap key-value metadata that
//! is available even before the full object has been materialized.

mod definition;
mod instance;
mod stack;

pub use definition::DefinitionContainer;
pub use instance::{EmptyInstanceContainer, InstanceContainer};
pub use stack::ContainerStack;

pub(crate) use instance::EMPTY_CONTAINER_ID;

use crate::events::ObservableMetadata;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Runtime variant of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    /// Read-mostly settings template
    Definition,
    /// User-editable settings values
    Instance,
    /// Ordered composition of containers
    Stack,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Definition => "definition",
            ContainerKind::Instance => "instance",
            ContainerKind::Stack => "stack",
        }
    }
}

/// Cheap key-value summary of a container
///
/// Always carries the container kind plus at least the `id` and `name`
/// fields; providers may add arbitrary extra fields. Queries match against
/// these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    pub kind: ContainerKind,
    pub fields: HashMap<String, String>,
}

impl ContainerMetadata {
    pub fn new(kind: ContainerKind, id: &str, name: &str) -> Self {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), id.to_string());
        fields.insert("name".to_string(), name.to_string());
        ContainerMetadata { kind, fields }
    }

    /// Builder-style extra field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        self.fields.get("id").map(String::as_str).unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.fields.get("name").map(String::as_str).unwrap_or("")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Error raised by [`Container::serialize`]
#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("serialization is not supported for this container")]
    Unsupported,

    #[error("serialization failed: {0}")]
    Failed(String),
}

/// The container abstraction the registry aggregates
///
/// Implementations use interior mutability so the registry can share them
/// behind `Arc` while still renaming and marking them clean after a save.
/// The id is globally unique and is only ever changed by the registry as
/// part of a rename, where the table entry moves to the new key.
pub trait Container: Send + Sync {
    fn id(&self) -> String;

    fn name(&self) -> String;

    fn set_name(&self, name: &str);

    /// Re-key the container during a rename. Callers own moving the table
    /// entries; the id itself is never reassigned outside of that move.
    fn set_id(&self, id: &str);

    fn kind(&self) -> ContainerKind;

    /// Snapshot of the current metadata
    fn metadata(&self) -> ContainerMetadata;

    /// Whether unsaved in-memory changes exist. Definitions have no dirty
    /// flag and always report `false`.
    fn is_dirty(&self) -> bool {
        false
    }

    /// Called by the registry after a successful save
    fn mark_clean(&self) {}

    fn serialize(&self) -> Result<String, SerializeError> {
        Err(SerializeError::Unsupported)
    }

    /// The metadata-change notification capability, when supported
    fn as_observable(&self) -> Option<&dyn ObservableMetadata> {
        None
    }
}
