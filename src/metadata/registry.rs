//! Provider registry: named registration, configured consultation order.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::metadata::RemoteMetadataProvider;

/// Holds every registered provider in consultation order.
///
/// Registration order is consultation order; earlier providers get first
/// claim on unknown fields under the merge engine's first-writer rule.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn RemoteMetadataProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn RemoteMetadataProvider>) {
        if self.get(provider.name()).is_some() {
            warn!(provider = provider.name(), "duplicate provider registration ignored");
            return;
        }
        if !provider.is_available() {
            warn!(provider = provider.name(), "provider unavailable, skipped for this run");
            return;
        }
        debug!(provider = provider.name(), host = provider.host(), "provider registered");
        self.providers.push(provider);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn RemoteMetadataProvider>> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// Providers in consultation order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn RemoteMetadataProvider>> {
        self.providers.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }
}
