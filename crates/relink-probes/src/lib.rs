//! Connectivity probes for Relink datasources
//!
//! Each probe opens a single connection with the supplied credentials, runs a
//! trivial round trip and closes it again. Nothing is cached between probes.

mod mongo;
mod rest;
mod sql;

use std::sync::Arc;
use std::time::Duration;

use relink_import_types::ProbeRegistry;

pub use mongo::MongoProbe;
pub use rest::RestApiProbe;
pub use sql::{MySqlProbe, PostgresProbe};

/// Connect timeout used by the default probes
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Registry with a probe for every supported datasource type
pub fn default_registry() -> ProbeRegistry {
    registry_with_timeout(DEFAULT_CONNECT_TIMEOUT)
}

pub fn registry_with_timeout(connect_timeout: Duration) -> ProbeRegistry {
    ProbeRegistry::new()
        .with(Arc::new(PostgresProbe::new(connect_timeout)))
        .with(Arc::new(MySqlProbe::new(connect_timeout)))
        .with(Arc::new(MongoProbe::new(connect_timeout)))
        .with(Arc::new(RestApiProbe::new(connect_timeout)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relink_import_types::DatasourceType;

    #[test]
    fn test_default_registry_covers_every_type() {
        let registry = default_registry();

        assert_eq!(registry.supported_types(), DatasourceType::get_all());
    }
}
