//! Connectivity probe trait and registry

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::bundle::DatasourceType;
use crate::credentials::DatasourceCredentials;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Network or protocol failure reaching the system
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Credentials were handed to the wrong probe
    #[error("Unsupported credentials: {0}")]
    UnsupportedCredentials(String),
}

/// Checks that a credential set can reach its external system
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    fn datasource_type(&self) -> DatasourceType;

    /// Connect, run a trivial round trip, and disconnect
    async fn probe(&self, credentials: &DatasourceCredentials) -> Result<(), ProbeError>;
}

/// Probes keyed by the datasource type they handle
#[derive(Clone, Default)]
pub struct ProbeRegistry {
    probes: HashMap<DatasourceType, Arc<dyn ConnectivityProbe>>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a probe, replacing any previous one for the same type
    pub fn register(&mut self, probe: Arc<dyn ConnectivityProbe>) {
        self.probes.insert(probe.datasource_type(), probe);
    }

    pub fn with(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.register(probe);
        self
    }

    pub fn get(&self, datasource_type: DatasourceType) -> Option<Arc<dyn ConnectivityProbe>> {
        self.probes.get(&datasource_type).cloned()
    }

    pub fn supported_types(&self) -> Vec<DatasourceType> {
        let mut types: Vec<_> = self.probes.keys().copied().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeRegistry")
            .field("types", &self.supported_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysUp(DatasourceType);

    #[async_trait]
    impl ConnectivityProbe for AlwaysUp {
        fn datasource_type(&self) -> DatasourceType {
            self.0
        }

        async fn probe(&self, _credentials: &DatasourceCredentials) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_replaces_probe_for_same_type() {
        let mut registry = ProbeRegistry::new();
        registry.register(Arc::new(AlwaysUp(DatasourceType::Mongo)));
        registry.register(Arc::new(AlwaysUp(DatasourceType::Mongo)));

        assert_eq!(registry.supported_types(), vec![DatasourceType::Mongo]);
    }

    #[test]
    fn test_registry_lookup_misses_unregistered_type() {
        let registry = ProbeRegistry::new().with(Arc::new(AlwaysUp(DatasourceType::Postgres)));

        assert!(registry.get(DatasourceType::Postgres).is_some());
        assert!(registry.get(DatasourceType::MySql).is_none());
    }
}
