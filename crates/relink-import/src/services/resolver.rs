//! Dependency resolution
//!
//! Pure set difference between what a bundle references and what the
//! destination workspace already has. No I/O happens here.

use relink_import_types::{
    Datasource, DatasourceId, DatasourceReference, DatasourceType, PendingReconnection,
};
use std::collections::{BTreeMap, HashMap};

fn index(existing: &[Datasource]) -> HashMap<(&str, DatasourceType), DatasourceId> {
    existing
        .iter()
        .map(|d| ((d.name.as_str(), d.datasource_type), d.id))
        .collect()
}

/// One `Pending` record per reference without a live counterpart, in input order.
///
/// A counterpart must match both name and type.
pub fn resolve_dependencies(
    references: &[DatasourceReference],
    existing: &[Datasource],
) -> Vec<PendingReconnection> {
    let live = index(existing);
    references
        .iter()
        .filter(|r| !live.contains_key(&(r.name.as_str(), r.datasource_type)))
        .map(PendingReconnection::new)
        .collect()
}

/// Bindings for the references that already have a live counterpart
pub fn resolve_bindings(
    references: &[DatasourceReference],
    existing: &[Datasource],
) -> BTreeMap<String, DatasourceId> {
    let live = index(existing);
    references
        .iter()
        .filter_map(|r| {
            live.get(&(r.name.as_str(), r.datasource_type))
                .map(|id| (r.name.clone(), *id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use relink_import_types::{ReconnectionStatus, WorkspaceId};

    fn live(name: &str, datasource_type: DatasourceType) -> Datasource {
        Datasource {
            id: DatasourceId::new(),
            workspace_id: WorkspaceId::new(),
            name: name.to_string(),
            datasource_type,
            encrypted_credentials: String::new(),
            created_at: Utc::now(),
        }
    }

    fn ted_references() -> Vec<DatasourceReference> {
        vec![
            DatasourceReference::new("TEDPostgres", DatasourceType::Postgres),
            DatasourceReference::new("TEDMySQL", DatasourceType::MySql),
            DatasourceReference::new("TEDMongo", DatasourceType::Mongo),
        ]
    }

    #[test]
    fn test_every_reference_is_pending_in_an_empty_workspace() {
        // Arrange
        let references = ted_references();

        // Act
        let pending = resolve_dependencies(&references, &[]);

        // Assert
        let names: Vec<_> = pending.iter().map(|p| p.datasource_name.as_str()).collect();
        assert_eq!(names, vec!["TEDPostgres", "TEDMySQL", "TEDMongo"]);
        assert!(pending
            .iter()
            .all(|p| p.status == ReconnectionStatus::Pending && p.attempts == 0));
    }

    #[test]
    fn test_matching_name_and_type_is_bound_not_pending() {
        // Arrange
        let references = ted_references();
        let existing = vec![live("TEDMySQL", DatasourceType::MySql)];

        // Act
        let pending = resolve_dependencies(&references, &existing);
        let bindings = resolve_bindings(&references, &existing);

        // Assert
        let names: Vec<_> = pending.iter().map(|p| p.datasource_name.as_str()).collect();
        assert_eq!(names, vec!["TEDPostgres", "TEDMongo"]);
        assert_eq!(bindings.get("TEDMySQL"), Some(&existing[0].id));
        assert_eq!(bindings.len(), 1);
    }

    #[test]
    fn test_same_name_with_other_type_is_not_a_match() {
        let references = vec![DatasourceReference::new(
            "TEDPostgres",
            DatasourceType::Postgres,
        )];
        let existing = vec![live("TEDPostgres", DatasourceType::MySql)];

        let pending = resolve_dependencies(&references, &existing);

        assert_eq!(pending.len(), 1);
        assert!(resolve_bindings(&references, &existing).is_empty());
    }
}
