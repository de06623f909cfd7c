//! # Canister - Federated Settings-Container Registry
//!
//! `canister` aggregates named, versioned settings containers from multiple
//! pluggable providers and answers attribute-matching queries over their
//! metadata efficiently:
//!
//! - **Provider aggregation** with priority ordering and first-writer-wins
//!   semantics for duplicate ids
//! - **Lazy metadata**: cheap metadata for every known container, full
//!   objects only materialized on `load`
//! - **Cached queries** with exact and `*`-wildcard matching, bounded LRU
//!   caching and precise invalidation on mutation
//! - **Locked persistence**: dirty containers serialized atomically under a
//!   cross-process directory lock, plus a versioned binary definition cache
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use canister::{
//!     ContainerQuery, ContainerRegistry, ContainerTypeRegistry, InstanceContainer,
//!     ResourceLocator, Result,
//! };
//!
//! # fn main() -> Result<()> {
//! let locator = ResourceLocator::new("/var/lib/app/config", "/var/cache/app");
//! let mut registry = ContainerRegistry::new(
//!     "5.0.0",
//!     locator,
//!     ContainerTypeRegistry::with_builtin_types(),
//! );
//!
//! // Register containers (providers can supply them in bulk via load())
//! registry.add_container(Arc::new(InstanceContainer::new("draft_profile", "Draft")));
//!
//! // Query by attributes; `*` is a wildcard
//! let query = ContainerQuery::builder().constraint("name", "Dra*").build();
//! for container in registry.find_containers(&query)? {
//!     println!("matched {}", container.id());
//! }
//!
//! // Persist everything that changed
//! registry.save_all();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod container;
pub mod defcache;
pub mod error;
pub mod events;
pub mod lockfile;
pub mod mime;
pub mod provider;
pub mod query;
pub mod registry;
pub mod resources;

pub use crate::cache::{CacheStats, QueryCache, MAX_QUERY_CACHE_SIZE};
pub use crate::container::{
    Container, ContainerKind, ContainerMetadata, ContainerStack, DefinitionContainer,
    EmptyInstanceContainer, InstanceContainer, SerializeError,
};
pub use crate::defcache::{CachedDefinition, DefinitionCache, CACHE_FORMAT_VERSION};
pub use crate::error::{RegistryError, Result};
pub use crate::events::{
    EventBus, MetadataListener, ObservableMetadata, RegistryEvent, SubscriptionId,
};
pub use crate::lockfile::{LockFile, LOCK_TIMEOUT};
pub use crate::mime::{ContainerTypeRegistry, MimeType};
pub use crate::provider::ContainerProvider;
pub use crate::query::{ContainerQuery, Matcher, QueryBuilder};
pub use crate::registry::ContainerRegistry;
pub use crate::resources::{ResourceCategory, ResourceLocator, LOCK_FILE_NAME};
