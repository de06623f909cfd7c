//! Container type / mimetype registry
//!
//! Maps container kinds to the plugin that registered them and to the
//! mimetype used for serialization. Constructed explicitly and injected into
//! the registry; there is no process-global state.

use crate::container::ContainerKind;
use std::collections::HashMap;
use tracing::warn;

/// Serialization format identifier for a container kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeType {
    /// Mimetype name, e.g. `application/x-canister-instancecontainer`
    pub name: String,
    /// Known file suffixes; the first one is preferred when writing
    pub suffixes: Vec<String>,
}

impl MimeType {
    pub fn new(name: &str, suffixes: &[&str]) -> Self {
        MimeType {
            name: name.to_string(),
            suffixes: suffixes.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn preferred_suffix(&self) -> &str {
        self.suffixes.first().map(String::as_str).unwrap_or("")
    }
}

/// Mapping between container kinds, plugin names and mimetypes
///
/// Populated once per plugin registration and read thereafter.
#[derive(Default)]
pub struct ContainerTypeRegistry {
    kinds_by_plugin: HashMap<String, ContainerKind>,
    kinds_by_mime: HashMap<String, ContainerKind>,
    mimes_by_kind: HashMap<ContainerKind, MimeType>,
}

impl ContainerTypeRegistry {
    /// An empty registry with no types registered
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in kinds
    pub fn with_builtin_types() -> Self {
        let mut registry = Self::new();
        registry.register(
            "definition",
            ContainerKind::Definition,
            MimeType::new("application/x-canister-definitioncontainer", &["def.json"]),
        );
        registry.register(
            "instance",
            ContainerKind::Instance,
            MimeType::new("application/x-canister-instancecontainer", &["inst.json"]),
        );
        registry.register(
            "stack",
            ContainerKind::Stack,
            MimeType::new("application/x-canister-containerstack", &["stack.json"]),
        );
        registry
    }

    /// Associate a kind with the plugin that supplies it and its mimetype
    pub fn register(&mut self, plugin_name: &str, kind: ContainerKind, mime: MimeType) {
        self.kinds_by_plugin.insert(plugin_name.to_string(), kind);
        self.kinds_by_mime.insert(mime.name.clone(), kind);
        self.mimes_by_kind.insert(kind, mime);
    }

    /// Mimetype for a kind; logs a warning and returns `None` when the kind
    /// was never registered rather than failing hard
    pub fn mime_for_kind(&self, kind: ContainerKind) -> Option<&MimeType> {
        let mime = self.mimes_by_kind.get(&kind);
        if mime.is_none() {
            warn!("Unable to find mimetype for container kind {}", kind.as_str());
        }
        mime
    }

    /// Container kind registered for a mimetype name
    pub fn kind_for_mime(&self, mime_name: &str) -> Option<ContainerKind> {
        self.kinds_by_mime.get(mime_name).copied()
    }

    /// All registered (plugin name, kind) pairs
    pub fn container_types(&self) -> impl Iterator<Item = (&str, ContainerKind)> {
        self.kinds_by_plugin
            .iter()
            .map(|(plugin, kind)| (plugin.as_str(), *kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types() {
        let registry = ContainerTypeRegistry::with_builtin_types();

        let mime = registry.mime_for_kind(ContainerKind::Instance).unwrap();
        assert_eq!(mime.name, "application/x-canister-instancecontainer");
        assert_eq!(mime.preferred_suffix(), "inst.json");

        assert_eq!(
            registry.kind_for_mime("application/x-canister-definitioncontainer"),
            Some(ContainerKind::Definition)
        );
        assert_eq!(registry.container_types().count(), 3);
    }

    #[test]
    fn test_unregistered_kind_returns_none() {
        let registry = ContainerTypeRegistry::new();
        assert!(registry.mime_for_kind(ContainerKind::Stack).is_none());
        assert!(registry.kind_for_mime("application/unknown").is_none());
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = ContainerTypeRegistry::new();
        registry.register(
            "extruder_stacks",
            ContainerKind::Stack,
            MimeType::new("application/x-canister-extruderstack", &["extruder.json", "stack.json"]),
        );

        let mime = registry.mime_for_kind(ContainerKind::Stack).unwrap();
        assert_eq!(mime.preferred_suffix(), "extruder.json");
        assert_eq!(mime.suffixes.len(), 2);
    }
}
