//! Read-mostly definition containers

use super::{Container, ContainerKind, ContainerMetadata, SerializeError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DefinitionState {
    id: String,
    name: String,
    version: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    settings: HashMap<String, serde_json::Value>,
}

/// Settings template, loaded from a definition file
///
/// Definitions carry no dirty flag: `save_all` serializes every definition
/// unconditionally. A definition may inherit from other definition files;
/// those paths feed the staleness check of the binary definition cache.
pub struct DefinitionContainer {
    state: RwLock<DefinitionState>,
    inherited_files: RwLock<Vec<PathBuf>>,
}

impl DefinitionContainer {
    pub fn new(id: &str, name: &str, version: &str) -> Self {
        DefinitionContainer {
            state: RwLock::new(DefinitionState {
                id: id.to_string(),
                name: name.to_string(),
                version: version.to_string(),
                metadata: HashMap::new(),
                settings: HashMap::new(),
            }),
            inherited_files: RwLock::new(Vec::new()),
        }
    }

    /// Reconstruct a definition from its serialized form
    pub fn from_serialized(data: &str) -> Result<Self, serde_json::Error> {
        let state: DefinitionState = serde_json::from_str(data)?;
        Ok(DefinitionContainer {
            state: RwLock::new(state),
            inherited_files: RwLock::new(Vec::new()),
        })
    }

    pub fn set_metadata_entry(&self, key: &str, value: &str) {
        self.state
            .write()
            .metadata
            .insert(key.to_string(), value.to_string());
    }

    pub fn set_setting(&self, key: &str, value: serde_json::Value) {
        self.state.write().settings.insert(key.to_string(), value);
    }

    pub fn setting(&self, key: &str) -> Option<serde_json::Value> {
        self.state.read().settings.get(key).cloned()
    }

    /// Files this definition inherits from, for cache staleness checks
    pub fn inherited_files(&self) -> Vec<PathBuf> {
        self.inherited_files.read().clone()
    }

    pub fn add_inherited_file(&self, path: PathBuf) {
        self.inherited_files.write().push(path);
    }
}

impl Container for DefinitionContainer {
    fn id(&self) -> String {
        self.state.read().id.clone()
    }

    fn name(&self) -> String {
        self.state.read().name.clone()
    }

    fn set_name(&self, name: &str) {
        self.state.write().name = name.to_string();
    }

    fn set_id(&self, id: &str) {
        self.state.write().id = id.to_string();
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Definition
    }

    fn metadata(&self) -> ContainerMetadata {
        let state = self.state.read();
        let mut meta = ContainerMetadata::new(ContainerKind::Definition, &state.id, &state.name)
            .with_field("version", &state.version);
        for (key, value) in &state.metadata {
            meta.fields.insert(key.clone(), value.clone());
        }
        meta
    }

    fn serialize(&self) -> Result<String, SerializeError> {
        serde_json::to_string_pretty(&*self.state.read())
            .map_err(|e| SerializeError::Failed(e.to_string()))
    }
}
