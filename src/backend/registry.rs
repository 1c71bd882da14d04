//! Static mapping from provider to backend.

use std::collections::HashMap;
use std::sync::Arc;

use super::{InferenceBackend, ProviderId};

/// Composition root for backends. Built once at startup and then shared
/// read-only with the orchestrator.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<ProviderId, Arc<dyn InferenceBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `register`.
    pub fn with(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.register(backend);
        self
    }

    /// Register a backend under its own provider id, replacing any previous one.
    pub fn register(&mut self, backend: Arc<dyn InferenceBackend>) -> Option<Arc<dyn InferenceBackend>> {
        self.backends.insert(backend.provider(), backend)
    }

    pub fn get(&self, provider: ProviderId) -> Option<Arc<dyn InferenceBackend>> {
        self.backends.get(&provider).cloned()
    }

    pub fn contains(&self, provider: ProviderId) -> bool {
        self.backends.contains_key(&provider)
    }

    /// Registered providers in canonical order.
    pub fn providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL.into_iter().filter(|p| self.contains(*p)).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    #[test]
    fn test_register_and_lookup() {
        let registry = BackendRegistry::new()
            .with(Arc::new(MockBackend::new(ProviderId::OnDeviceService)))
            .with(Arc::new(MockBackend::new(ProviderId::NativeCpp)));

        assert_eq!(registry.len(), 2);
        assert!(registry.get(ProviderId::NativeCpp).is_some());
        assert!(registry.get(ProviderId::LiteRuntime).is_none());
        assert_eq!(
            registry.providers(),
            vec![ProviderId::NativeCpp, ProviderId::OnDeviceService]
        );
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = BackendRegistry::new();
        assert!(registry
            .register(Arc::new(MockBackend::new(ProviderId::LiteRuntime)))
            .is_none());
        assert!(registry
            .register(Arc::new(MockBackend::new(ProviderId::LiteRuntime)))
            .is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_registry() {
        let registry = BackendRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.providers().is_empty());
    }
}
