//! Container providers
//!
//! A provider is an external source of containers: it can enumerate ids,
//! load cheap metadata per id, and materialize full container objects.
//! Providers are totally ordered by priority; the registry keeps its
//! provider list sorted and lets the first provider that knows an id win.

use crate::container::{Container, ContainerMetadata};
use std::sync::Arc;

/// External source of containers, consumed by the registry
///
/// `load_metadata` is expected to be cheap; `load_container` may be
/// expensive (parsing files, writing cache artifacts). Either may return
/// `None` when the id cannot be loaded; the registry logs and skips it.
pub trait ContainerProvider: Send + Sync {
    /// Sort key: lower priority values are consulted first
    fn priority(&self) -> i32;

    /// All container ids this provider can supply
    fn all_ids(&self) -> Vec<String>;

    /// Load only the metadata for one id
    fn load_metadata(&self, id: &str) -> Option<ContainerMetadata>;

    /// Materialize the full container for one id
    fn load_container(&self, id: &str) -> Option<Arc<dyn Container>>;
}

/// Sort providers by ascending priority, keeping insertion order for ties
pub(crate) fn sort_providers(providers: &mut [Arc<dyn ContainerProvider>]) {
    providers.sort_by_key(|provider| provider.priority());
}
