//! End-to-end registry tests: provider aggregation, persistence round trips
//! and cross-instance locking over real temp directories.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use canister::{
    Container, ContainerKind, ContainerMetadata, ContainerProvider, ContainerQuery,
    ContainerRegistry, ContainerStack, ContainerTypeRegistry, DefinitionContainer,
    InstanceContainer, ResourceCategory, ResourceLocator,
};
use tempfile::TempDir;

/// Provider that serves instance containers saved by a previous registry
struct StorageProvider {
    storage_dir: PathBuf,
    priority: i32,
}

impl StorageProvider {
    fn ids_to_paths(&self) -> Vec<(String, PathBuf)> {
        let Ok(entries) = fs::read_dir(&self.storage_dir) else {
            return Vec::new();
        };
        let mut found: Vec<(String, PathBuf)> = entries
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                let name = path.file_name()?.to_str()?;
                let id = name.strip_suffix(".inst.json")?;
                Some((id.to_string(), path.clone()))
            })
            .collect();
        found.sort();
        found
    }

    fn read(&self, id: &str) -> Option<InstanceContainer> {
        let (_, path) = self.ids_to_paths().into_iter().find(|(i, _)| i == id)?;
        let data = fs::read_to_string(path).ok()?;
        InstanceContainer::from_serialized(&data).ok()
    }
}

impl ContainerProvider for StorageProvider {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn all_ids(&self) -> Vec<String> {
        self.ids_to_paths().into_iter().map(|(id, _)| id).collect()
    }

    fn load_metadata(&self, id: &str) -> Option<ContainerMetadata> {
        Some(self.read(id)?.metadata())
    }

    fn load_container(&self, id: &str) -> Option<Arc<dyn Container>> {
        Some(Arc::new(self.read(id)?))
    }
}

fn new_registry(temp: &TempDir) -> ContainerRegistry {
    let locator = ResourceLocator::new(temp.path().join("config"), temp.path().join("cache"));
    ContainerRegistry::new("5.0.0", locator, ContainerTypeRegistry::with_builtin_types())
}

fn instance_storage(temp: &TempDir) -> PathBuf {
    temp.path().join("config").join("instances")
}

#[test]
fn save_then_reload_through_provider() {
    let temp = TempDir::new().unwrap();

    {
        let mut registry = new_registry(&temp);
        let profile = Arc::new(InstanceContainer::new("draft", "Draft Profile"));
        profile.set_value("layer_height", "0.3");
        profile.set_metadata_entry("quality", "draft");
        registry.add_container(profile);
        registry.save_all();
    }

    // A fresh registry sees the saved container through a provider
    let mut registry = new_registry(&temp);
    registry.add_provider(Arc::new(StorageProvider {
        storage_dir: instance_storage(&temp),
        priority: 0,
    }));

    registry.load_all_metadata();
    let query = ContainerQuery::builder()
        .kind(ContainerKind::Instance)
        .constraint("quality", "draft")
        .build();
    let metadata = registry.find_containers_metadata(&query);
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata[0].id(), "draft");

    // Metadata-only: the object itself is not materialized yet
    assert!(registry.find_containers(&query).is_err());

    registry.load().unwrap();
    let containers = registry.find_containers(&query).unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].name(), "Draft Profile");
    assert!(!containers[0].is_dirty());
}

#[test]
fn clean_containers_are_not_rewritten() {
    let temp = TempDir::new().unwrap();
    let mut registry = new_registry(&temp);

    let profile = Arc::new(InstanceContainer::new("draft", "Draft Profile"));
    profile.set_value("layer_height", "0.3");
    registry.add_container(Arc::clone(&profile) as Arc<dyn Container>);
    registry.save_all();

    let file = instance_storage(&temp).join("draft.inst.json");
    let first_mtime = fs::metadata(&file).unwrap().modified().unwrap();
    let stamp = first_mtime - std::time::Duration::from_secs(60);
    fs::File::options()
        .append(true)
        .open(&file)
        .unwrap()
        .set_modified(stamp)
        .unwrap();

    // Not dirty anymore, so a second save leaves the file untouched
    registry.save_all();
    assert_eq!(fs::metadata(&file).unwrap().modified().unwrap(), stamp);

    profile.set_value("layer_height", "0.2");
    registry.save_all();
    assert!(fs::metadata(&file).unwrap().modified().unwrap() > stamp);
}

#[test]
fn rename_persists_under_new_identity() {
    let temp = TempDir::new().unwrap();
    let mut registry = new_registry(&temp);

    let profile = Arc::new(InstanceContainer::new("draft", "Draft Profile"));
    profile.set_value("layer_height", "0.3");
    registry.add_container(profile);
    registry.save_all();
    assert!(instance_storage(&temp).join("draft.inst.json").is_file());

    registry.rename_container("draft", "Fine Profile", Some("fine"));
    assert!(!instance_storage(&temp).join("draft.inst.json").exists());

    registry.save_all();
    let restored = InstanceContainer::from_serialized(
        &fs::read_to_string(instance_storage(&temp).join("fine.inst.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(restored.id(), "fine");
    assert_eq!(restored.name(), "Fine Profile");
}

#[test]
fn mixed_kinds_save_to_their_categories() {
    let temp = TempDir::new().unwrap();
    let mut registry = new_registry(&temp);

    registry.add_container(Arc::new(DefinitionContainer::new("printer", "Printer", "2")));
    let stack = Arc::new(ContainerStack::new("machine", "Machine"));
    stack.push_container("empty");
    registry.add_container(stack);
    let instance = Arc::new(InstanceContainer::new("draft", "Draft"));
    instance.set_value("speed", "60");
    registry.add_container(instance);

    registry.save_all();

    let config = temp.path().join("config");
    assert!(config.join("definitions").join("printer.def.json").is_file());
    assert!(config.join("stacks").join("machine.stack.json").is_file());
    assert!(config.join("instances").join("draft.inst.json").is_file());
}

#[test]
fn definition_cache_round_trip_through_registry() {
    let temp = TempDir::new().unwrap();
    let registry = new_registry(&temp);

    let source = temp.path().join("printer.def.json");
    let definition = DefinitionContainer::new("printer", "Printer", "2");
    definition.set_setting("layer_height", serde_json::json!(0.15));
    fs::write(&source, definition.serialize().unwrap()).unwrap();

    let cache = registry.definition_cache();
    cache
        .store(
            "printer",
            definition.metadata(),
            definition.serialize().unwrap(),
            &source,
            &[],
        )
        .unwrap();

    let record = cache.load("printer", &source, &[]).unwrap();
    let restored = DefinitionContainer::from_serialized(&record.payload).unwrap();
    assert_eq!(restored.id(), "printer");
    assert_eq!(restored.setting("layer_height"), Some(serde_json::json!(0.15)));
}

#[test]
fn load_holds_the_cache_lock() {
    let temp = TempDir::new().unwrap();
    let mut registry = new_registry(&temp);

    // A competing registry instance holds the cache lock, so load times out
    let other = new_registry(&temp);
    let _held = other.lock_cache().unwrap();

    assert!(registry.load().is_err());
    drop(_held);
    assert!(registry.load().is_ok());
}

#[test]
fn provider_priority_decides_duplicate_ids() {
    struct CannedProvider {
        priority: i32,
        source: &'static str,
    }

    impl ContainerProvider for CannedProvider {
        fn priority(&self) -> i32 {
            self.priority
        }

        fn all_ids(&self) -> Vec<String> {
            vec!["shared".to_string()]
        }

        fn load_metadata(&self, id: &str) -> Option<ContainerMetadata> {
            Some(
                ContainerMetadata::new(ContainerKind::Instance, id, id)
                    .with_field("source", self.source),
            )
        }

        fn load_container(&self, id: &str) -> Option<Arc<dyn Container>> {
            let instance = InstanceContainer::new(id, id);
            instance.set_metadata_entry("source", self.source);
            Some(Arc::new(instance))
        }
    }

    let temp = TempDir::new().unwrap();
    let mut registry = new_registry(&temp);
    registry.add_provider(Arc::new(CannedProvider {
        priority: 50,
        source: "fallback",
    }));
    registry.add_provider(Arc::new(CannedProvider {
        priority: 1,
        source: "preferred",
    }));

    registry.load().unwrap();
    let found = registry
        .find_containers(&ContainerQuery::builder().constraint("id", "shared").build())
        .unwrap();
    assert_eq!(found[0].metadata().get("source"), Some("preferred"));
}

#[test]
fn resource_categories_are_extensible() {
    let temp = TempDir::new().unwrap();
    let mut registry = new_registry(&temp);
    let before = registry.resource_categories().len();

    registry.add_resource_category(ResourceCategory::Instances); // already present
    assert_eq!(registry.resource_categories().len(), before);
}
