//! Registry core
//!
//! Aggregates all container data from all providers. If only metadata is
//! needed it is requested lazily and cheaply from the providers; full
//! containers are materialized by `load`. Queries run against the aggregated
//! metadata table and are cached; mutations invalidate exactly the affected
//! cache entries.

use crate::cache::{CacheStats, QueryCache};
use crate::container::{
    Container, ContainerKind, ContainerMetadata, EmptyInstanceContainer, SerializeError,
    EMPTY_CONTAINER_ID,
};
use crate::defcache::DefinitionCache;
use crate::error::{RegistryError, Result};
use crate::events::{EventBus, RegistryEvent, SubscriptionId};
use crate::lockfile::LockFile;
use crate::mime::ContainerTypeRegistry;
use crate::provider::{sort_providers, ContainerProvider};
use crate::query::{ContainerQuery, QueryBuilder};
use crate::resources::{atomic_write, file_safe_id, ResourceCategory, ResourceLocator};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::{debug, error, warn};

/// Fallback name when stripping a numbering suffix leaves nothing
const DEFAULT_UNIQUE_NAME: &str = "Profile";

/// Trailing `" #N"` numbering suffix stripped by `unique_name`
static NUMBERING_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*#\d+$").expect("valid numbering pattern"));

/// Central class to manage all settings containers
///
/// Owns the master metadata and container tables. Providers are consulted in
/// ascending priority order and the first provider that knows an id wins;
/// later providers never overwrite an existing entry. The synthetic empty
/// instance container is always registered under the id `empty`.
///
/// Reads (`find_*`) may interleave with each other, but callers must
/// serialize writes (`add_container`, `remove_container`, `rename_container`,
/// `load*`) externally when sharing a registry across threads.
pub struct ContainerRegistry {
    app_version: String,
    locator: ResourceLocator,
    types: ContainerTypeRegistry,
    providers: Vec<Arc<dyn ContainerProvider>>,
    metadata: Arc<Mutex<HashMap<String, ContainerMetadata>>>,
    containers: HashMap<String, Arc<dyn Container>>,
    resource_categories: Vec<ResourceCategory>,
    query_cache: Arc<Mutex<QueryCache>>,
    events: Arc<EventBus>,
    empty: Arc<dyn Container>,
    metadata_subscriptions: HashMap<String, SubscriptionId>,
}

impl ContainerRegistry {
    pub fn new(
        app_version: &str,
        locator: ResourceLocator,
        types: ContainerTypeRegistry,
    ) -> Self {
        let empty: Arc<dyn Container> = Arc::new(EmptyInstanceContainer);
        let mut containers: HashMap<String, Arc<dyn Container>> = HashMap::new();
        let mut metadata = HashMap::new();
        containers.insert(empty.id(), Arc::clone(&empty));
        metadata.insert(empty.id(), empty.metadata());

        ContainerRegistry {
            app_version: app_version.to_string(),
            locator,
            types,
            providers: Vec::new(),
            metadata: Arc::new(Mutex::new(metadata)),
            containers,
            resource_categories: vec![
                ResourceCategory::Definitions,
                ResourceCategory::Instances,
                ResourceCategory::Stacks,
            ],
            query_cache: Arc::new(Mutex::new(QueryCache::new())),
            events: Arc::new(EventBus::new()),
            empty,
            metadata_subscriptions: HashMap::new(),
        }
    }

    /// Insert a provider, keeping the list sorted by ascending priority.
    /// Equal priorities keep insertion order.
    pub fn add_provider(&mut self, provider: Arc<dyn ContainerProvider>) {
        self.providers.push(provider);
        sort_providers(&mut self.providers);
    }

    /// Subscribe to registry events (added / removed / metadata changed)
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(subscriber);
    }

    /// The reserved synthetic empty instance container
    pub fn empty_instance_container(&self) -> Arc<dyn Container> {
        Arc::clone(&self.empty)
    }

    pub fn add_resource_category(&mut self, category: ResourceCategory) {
        if !self.resource_categories.contains(&category) {
            self.resource_categories.push(category);
        }
    }

    pub fn resource_categories(&self) -> &[ResourceCategory] {
        &self.resource_categories
    }

    pub fn container_types(&self) -> &ContainerTypeRegistry {
        &self.types
    }

    pub fn container_types_mut(&mut self) -> &mut ContainerTypeRegistry {
        &mut self.types
    }

    /// Binary definition cache for this registry's application version
    pub fn definition_cache(&self) -> DefinitionCache {
        DefinitionCache::new(&self.locator, &self.app_version)
    }

    /// Load the metadata of every container every provider knows about
    ///
    /// Idempotent: a second call only fills gaps, never overwrites entries,
    /// so the first provider (in priority order) that supplies an id wins.
    pub fn load_all_metadata(&mut self) {
        let mut metadata = self.metadata.lock();
        for provider in &self.providers {
            for container_id in provider.all_ids() {
                if metadata.contains_key(&container_id) {
                    continue;
                }
                match provider.load_metadata(&container_id) {
                    Some(entry) => {
                        metadata.insert(container_id, entry);
                    }
                    None => warn!("Provider could not load metadata for {}", container_id),
                }
            }
        }
    }

    /// Materialize every available container, filling both tables
    ///
    /// Runs under the cache-directory lock because providers may write cache
    /// artifacts while loading. Already-populated entries are kept; repeated
    /// calls are additive, never destructive.
    pub fn load(&mut self) -> Result<()> {
        self.load_with_progress(|_, _| {})
    }

    /// Like [`load`](Self::load), reporting `(done, total)` after each id
    pub fn load_with_progress(&mut self, mut progress: impl FnMut(usize, usize)) -> Result<()> {
        let _cache_lock = self.lock_cache()?;
        let start = Instant::now();

        let ids_per_provider: Vec<Vec<String>> =
            self.providers.iter().map(|p| p.all_ids()).collect();
        let total: usize = ids_per_provider.iter().map(Vec::len).sum();
        self.containers.reserve(total);
        self.metadata.lock().reserve(total);

        let mut done = 0;
        for (provider, ids) in self.providers.iter().zip(ids_per_provider) {
            for container_id in ids {
                done += 1;
                if self.containers.contains_key(&container_id) {
                    progress(done, total);
                    continue;
                }
                match provider.load_container(&container_id) {
                    Some(container) => {
                        self.metadata
                            .lock()
                            .insert(container_id.clone(), container.metadata());
                        self.containers.insert(container_id, container);
                    }
                    None => warn!("Provider could not load container {}", container_id),
                }
                progress(done, total);
            }
        }

        debug!(
            "Loading data into container registry took {:?}",
            start.elapsed()
        );
        Ok(())
    }

    /// Register an in-memory container
    ///
    /// A no-op (with a warning) when a container of the same kind and id is
    /// already registered. Subscribes to the container's metadata-change
    /// capability when it has one, invalidates the affected cache entries and
    /// emits a container-added event.
    pub fn add_container(&mut self, container: Arc<dyn Container>) {
        let id = container.id();
        let kind = container.kind();
        if self
            .containers
            .get(&id)
            .is_some_and(|existing| existing.kind() == kind)
        {
            warn!(
                "Container of kind {} and id {} already added",
                kind.as_str(),
                id
            );
            return;
        }

        self.subscribe_to_metadata_changes(&id, &container);
        self.metadata.lock().insert(id.clone(), container.metadata());
        self.containers.insert(id, Arc::clone(&container));
        self.query_cache.lock().invalidate_kind(kind);
        self.events.emit(&RegistryEvent::ContainerAdded(container));
    }

    /// Remove a container and delete its backing files
    ///
    /// A no-op (with a warning) when the id is unknown or reserved.
    pub fn remove_container(&mut self, container_id: &str) {
        if container_id == EMPTY_CONTAINER_ID {
            warn!("Refusing to remove the reserved empty container");
            return;
        }
        let Some(container) = self.containers.remove(container_id) else {
            warn!(
                "Could not remove container with id {}, as no container with that ID is known",
                container_id
            );
            return;
        };

        self.metadata.lock().remove(container_id);
        self.delete_files(&container);
        self.unsubscribe_from_metadata_changes(container_id, &container);
        self.query_cache.lock().invalidate_kind(container.kind());
        self.events
            .emit(&RegistryEvent::ContainerRemoved(container));
        debug!("Removed container {}", container_id);
    }

    /// Rename a container, optionally moving it to a new id
    ///
    /// The old identity's backing files are deleted and a removed event is
    /// emitted before the added event for the new identity, so observers see
    /// the net identity change in order. A no-op (with a warning) when the id
    /// is unknown or reserved, or the name did not change.
    pub fn rename_container(&mut self, container_id: &str, new_name: &str, new_id: Option<&str>) {
        debug!("Renaming container {} to {}", container_id, new_name);
        if container_id == EMPTY_CONTAINER_ID {
            warn!("Refusing to rename the reserved empty container");
            return;
        }
        let Some(container) = self.containers.get(container_id).cloned() else {
            warn!(
                "Unable to rename container {}, because it does not exist",
                container_id
            );
            return;
        };

        if new_name == container.name() {
            warn!(
                "Unable to rename container {}, because the name ({}) didn't change",
                container_id, new_name
            );
            return;
        }

        self.delete_files(&container);
        self.events
            .emit(&RegistryEvent::ContainerRemoved(Arc::clone(&container)));

        container.set_name(new_name);
        let current_id = if let Some(new_id) = new_id {
            self.containers.remove(container_id);
            self.metadata.lock().remove(container_id);
            if let Some(subscription) = self.metadata_subscriptions.remove(container_id) {
                self.metadata_subscriptions
                    .insert(new_id.to_string(), subscription);
            }
            container.set_id(new_id);
            self.containers
                .insert(new_id.to_string(), Arc::clone(&container));
            new_id.to_string()
        } else {
            container_id.to_string()
        };
        self.metadata
            .lock()
            .insert(current_id, container.metadata());

        self.query_cache.lock().invalidate_kind(container.kind());
        self.events.emit(&RegistryEvent::ContainerAdded(container));
    }

    /// Find the metadata of all containers matching a query
    ///
    /// A plain id-only query bypasses the cache with a direct table lookup;
    /// anything else goes through the query cache.
    pub fn find_containers_metadata(&self, query: &ContainerQuery) -> Vec<ContainerMetadata> {
        if query.is_id_only() {
            if let Some(id) = query.id_constraint() {
                return self.metadata.lock().get(id).cloned().into_iter().collect();
            }
        }

        // The cache and table locks are never held together; the change
        // listener takes them in the opposite order.
        let cached = self.query_cache.lock().get(query);
        let ids = match cached {
            Some(ids) => ids,
            None => {
                let ids = {
                    let metadata = self.metadata.lock();
                    query.execute(&metadata)
                };
                self.query_cache.lock().put(query.clone(), ids.clone());
                ids
            }
        };

        let metadata = self.metadata.lock();
        ids.iter()
            .filter_map(|id| metadata.get(id).cloned())
            .collect()
    }

    /// Find all container objects matching a query
    ///
    /// Requires the container table to be populated for every id the query
    /// matches; a metadata match whose container was never materialized
    /// fails with [`RegistryError::MissingContainer`].
    pub fn find_containers(&self, query: &ContainerQuery) -> Result<Vec<Arc<dyn Container>>> {
        self.find_containers_metadata(query)
            .iter()
            .map(|entry| {
                self.containers
                    .get(entry.id())
                    .cloned()
                    .ok_or_else(|| RegistryError::MissingContainer(entry.id().to_string()))
            })
            .collect()
    }

    /// Find all definition containers matching the constraints
    pub fn find_definition_containers(
        &self,
        builder: QueryBuilder,
    ) -> Result<Vec<Arc<dyn Container>>> {
        self.find_containers(&builder.kind(ContainerKind::Definition).build())
    }

    pub fn find_definition_containers_metadata(
        &self,
        builder: QueryBuilder,
    ) -> Vec<ContainerMetadata> {
        self.find_containers_metadata(&builder.kind(ContainerKind::Definition).build())
    }

    /// Find all instance containers matching the constraints
    pub fn find_instance_containers(
        &self,
        builder: QueryBuilder,
    ) -> Result<Vec<Arc<dyn Container>>> {
        self.find_containers(&builder.kind(ContainerKind::Instance).build())
    }

    pub fn find_instance_containers_metadata(
        &self,
        builder: QueryBuilder,
    ) -> Vec<ContainerMetadata> {
        self.find_containers_metadata(&builder.kind(ContainerKind::Instance).build())
    }

    /// Find all container stacks matching the constraints
    pub fn find_container_stacks(&self, builder: QueryBuilder) -> Result<Vec<Arc<dyn Container>>> {
        self.find_containers(&builder.kind(ContainerKind::Stack).build())
    }

    pub fn find_container_stacks_metadata(&self, builder: QueryBuilder) -> Vec<ContainerMetadata> {
        self.find_containers_metadata(&builder.kind(ContainerKind::Stack).build())
    }

    /// Serialize dirty instances and stacks, and every definition, to their
    /// per-category storage paths
    ///
    /// Containers whose serialization is unsupported are skipped silently;
    /// any other per-container failure is logged and skipped without
    /// aborting the batch. Successfully saved containers are marked clean.
    pub fn save_all(&self) {
        for container in self.containers.values() {
            match container.kind() {
                ContainerKind::Definition => {}
                ContainerKind::Instance | ContainerKind::Stack => {
                    if !container.is_dirty() {
                        continue;
                    }
                }
            }
            self.save_container(container);
        }
    }

    fn save_container(&self, container: &Arc<dyn Container>) {
        let data = match container.serialize() {
            Ok(data) => data,
            Err(SerializeError::Unsupported) => return,
            Err(SerializeError::Failed(e)) => {
                error!(
                    "An exception occurred trying to serialize container {}: {}",
                    container.id(),
                    e
                );
                return;
            }
        };

        let Some(mime) = self.types.mime_for_kind(container.kind()) else {
            return;
        };
        let file_name = format!("{}.{}", file_safe_id(&container.id()), mime.preferred_suffix());
        let category = ResourceCategory::for_kind(container.kind());
        let path = match self.locator.storage_path(category) {
            Ok(dir) => dir.join(file_name),
            Err(e) => {
                error!(
                    "Could not resolve storage path for container {}: {}",
                    container.id(),
                    e
                );
                return;
            }
        };
        if let Err(e) = atomic_write(&path, data.as_bytes()) {
            error!("Could not write container {}: {}", container.id(), e);
            return;
        }
        container.mark_clean();
    }

    /// Create a unique name for a container that doesn't exist yet
    ///
    /// Strips whitespace and a trailing `" #N"` suffix, then appends `" #2"`,
    /// `" #3"`, ... until neither the id (case-insensitive) nor the display
    /// name collides with an existing container.
    pub fn unique_name(&self, original: &str) -> String {
        let trimmed = original.trim();

        let base = NUMBERING_SUFFIX
            .captures(trimmed)
            .map(|caps| caps.get(1).map_or("", |m| m.as_str()))
            .unwrap_or(trimmed);

        if base.is_empty() {
            // Stripping deleted everything, fall back to the placeholder
        } else if !self.name_taken(trimmed) {
            return trimmed.to_string();
        }
        let base = if base.is_empty() { DEFAULT_UNIQUE_NAME } else { base };

        let mut unique = base.to_string();
        let mut i = 1;
        while self.name_taken(&unique) {
            i += 1;
            unique = format!("{} #{}", base, i);
        }
        unique
    }

    fn name_taken(&self, name: &str) -> bool {
        let by_id = ContainerQuery::builder()
            .ignore_case(true)
            .constraint("id", name)
            .build();
        if !self.find_containers_metadata(&by_id).is_empty() {
            return true;
        }
        let by_name = ContainerQuery::builder().constraint("name", name).build();
        !self.find_containers_metadata(&by_name).is_empty()
    }

    /// Scoped exclusive lock on the config directory
    pub fn lock_file(&self) -> Result<LockFile> {
        LockFile::acquire(self.locator.config_lock_path())
    }

    /// Scoped exclusive lock on the cache directory
    pub fn lock_cache(&self) -> Result<LockFile> {
        LockFile::acquire(self.locator.cache_lock_path())
    }

    /// Query cache counters, for diagnostics and tests
    pub fn query_cache_stats(&self) -> CacheStats {
        self.query_cache.lock().stats()
    }

    /// Number of known metadata entries
    pub fn metadata_count(&self) -> usize {
        self.metadata.lock().len()
    }

    /// Number of materialized containers
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Subscribe to a container's metadata-change capability, when present.
    /// A change refreshes the metadata table entry, clears the whole query
    /// cache (any cached result could be affected) and re-emits a
    /// registry-level metadata-changed event.
    fn subscribe_to_metadata_changes(&mut self, id: &str, container: &Arc<dyn Container>) {
        let Some(observable) = container.as_observable() else {
            return;
        };

        let metadata = Arc::clone(&self.metadata);
        let cache = Arc::clone(&self.query_cache);
        let events = Arc::clone(&self.events);
        let weak = Arc::downgrade(container);
        let subscription = observable.subscribe_metadata_changed(Arc::new(move |changed_id| {
            if let Some(container) = weak.upgrade() {
                metadata
                    .lock()
                    .insert(changed_id.to_string(), container.metadata());
            }
            cache.lock().clear();
            events.emit(&RegistryEvent::MetadataChanged(changed_id.to_string()));
        }));
        self.metadata_subscriptions
            .insert(id.to_string(), subscription);
    }

    fn unsubscribe_from_metadata_changes(&mut self, id: &str, container: &Arc<dyn Container>) {
        if let Some(subscription) = self.metadata_subscriptions.remove(id) {
            if let Some(observable) = container.as_observable() {
                observable.unsubscribe_metadata_changed(subscription);
            }
        }
    }

    /// Remove all files related to a container from every registered
    /// resource category. Only storage paths are touched; a container loaded
    /// from a read-only resource path is effectively reset, not lost.
    fn delete_files(&self, container: &Arc<dyn Container>) {
        let Some(mime) = self.types.mime_for_kind(container.kind()) else {
            return;
        };
        let encoded = file_safe_id(&container.id());
        for category in &self.resource_categories {
            let Ok(dir) = self.locator.storage_path(*category) else {
                continue;
            };
            for suffix in &mime.suffixes {
                let path = dir.join(format!("{}.{}", encoded, suffix));
                if path.is_file() {
                    if let Err(e) = std::fs::remove_file(&path) {
                        warn!("Could not delete container file {}: {}", path.display(), e);
                    }
                }
            }
        }
    }
}
