//! Application bundle types
//!
//! A bundle is the JSON export of an application. It lists the datasources the
//! application's actions use, by name and plugin, and never carries credentials.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::error::{ImportError, Result};

/// Kind of external system a datasource connects to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DatasourceType {
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
    Mongo,
    #[serde(rename = "restapi")]
    RestApi,
}

impl DatasourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasourceType::Postgres => "postgres",
            DatasourceType::MySql => "mysql",
            DatasourceType::Mongo => "mongo",
            DatasourceType::RestApi => "restapi",
        }
    }

    /// Map an exported plugin identifier (e.g. `postgres-plugin`) to a type
    pub fn from_plugin_id(plugin_id: &str) -> Option<Self> {
        match plugin_id.trim().to_lowercase().as_str() {
            "postgres-plugin" => Some(DatasourceType::Postgres),
            "mysql-plugin" => Some(DatasourceType::MySql),
            "mongo-plugin" => Some(DatasourceType::Mongo),
            "restapi-plugin" => Some(DatasourceType::RestApi),
            _ => None,
        }
    }

    pub fn plugin_id(&self) -> &'static str {
        match self {
            DatasourceType::Postgres => "postgres-plugin",
            DatasourceType::MySql => "mysql-plugin",
            DatasourceType::Mongo => "mongo-plugin",
            DatasourceType::RestApi => "restapi-plugin",
        }
    }

    pub fn get_all() -> Vec<DatasourceType> {
        vec![
            DatasourceType::Postgres,
            DatasourceType::MySql,
            DatasourceType::Mongo,
            DatasourceType::RestApi,
        ]
    }
}

impl std::fmt::Display for DatasourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a bundle came from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BundleSource {
    /// Uploaded JSON file
    #[default]
    Json,
    /// Pulled from a Git repository; the resulting application stays linked to it
    Git {
        repository_url: String,
        branch: Option<String>,
    },
}

/// Datasource identity referenced by a bundle, without credentials
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct DatasourceReference {
    pub name: String,
    pub datasource_type: DatasourceType,
}

impl DatasourceReference {
    pub fn new(name: impl Into<String>, datasource_type: DatasourceType) -> Self {
        Self {
            name: name.into(),
            datasource_type,
        }
    }
}

impl std::fmt::Display for DatasourceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.datasource_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportedApplication {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Datasource entry as it appears in the export
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleDatasource {
    pub name: String,
    pub plugin_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundlePage {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleAction {
    pub name: String,
    /// Datasource the action runs against; JS objects have none
    #[serde(default)]
    pub datasource_name: Option<String>,
}

/// Serialized application definition. Immutable once uploaded.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportBundle {
    #[serde(default)]
    pub client_schema_version: u32,
    #[serde(default)]
    pub server_schema_version: u32,
    pub exported_application: ExportedApplication,
    #[serde(default)]
    pub datasource_list: Vec<BundleDatasource>,
    #[serde(default)]
    pub page_list: Vec<BundlePage>,
    #[serde(default)]
    pub action_list: Vec<BundleAction>,
}

impl ImportBundle {
    /// Parse a raw upload, rejecting anything that is not a usable bundle
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let bundle: ImportBundle = serde_json::from_slice(payload)
            .map_err(|e| ImportError::MalformedBundle(e.to_string()))?;

        if bundle.exported_application.name.trim().is_empty() {
            return Err(ImportError::MalformedBundle(
                "exportedApplication.name must not be empty".to_string(),
            ));
        }

        // Surface plugin/name problems at parse time rather than at resolution
        bundle.references()?;

        Ok(bundle)
    }

    pub fn application_name(&self) -> &str {
        self.exported_application.name.trim()
    }

    /// Typed datasource references in export order.
    ///
    /// Identical duplicates collapse to the first occurrence; the same name with
    /// two different plugins is malformed.
    pub fn references(&self) -> Result<Vec<DatasourceReference>> {
        let mut seen: HashMap<&str, DatasourceType> = HashMap::new();
        let mut references = Vec::with_capacity(self.datasource_list.len());

        for entry in &self.datasource_list {
            let name = entry.name.trim();
            if name.is_empty() {
                return Err(ImportError::MalformedBundle(
                    "datasource with empty name".to_string(),
                ));
            }

            let datasource_type = DatasourceType::from_plugin_id(&entry.plugin_id).ok_or_else(
                || {
                    ImportError::MalformedBundle(format!(
                        "datasource '{}' uses unsupported plugin '{}'",
                        name, entry.plugin_id
                    ))
                },
            )?;

            match seen.get(name) {
                Some(existing) if *existing == datasource_type => continue,
                Some(existing) => {
                    return Err(ImportError::MalformedBundle(format!(
                        "datasource '{}' is declared as both {} and {}",
                        name, existing, datasource_type
                    )))
                }
                None => {
                    seen.insert(name, datasource_type);
                    references.push(DatasourceReference::new(name, datasource_type));
                }
            }
        }

        Ok(references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ted_bundle() -> &'static str {
        r#"{
            "clientSchemaVersion": 1,
            "serverSchemaVersion": 6,
            "exportedApplication": { "name": "gitImport" },
            "datasourceList": [
                { "name": "TEDPostgres", "pluginId": "postgres-plugin" },
                { "name": "TEDMySQL", "pluginId": "mysql-plugin" },
                { "name": "TEDMongo", "pluginId": "mongo-plugin" }
            ],
            "pageList": [{ "name": "Page1" }],
            "actionList": [
                { "name": "get_users", "datasourceName": "TEDPostgres" },
                { "name": "JSObject1" }
            ],
            "decryptedFields": {}
        }"#
    }

    #[test]
    fn test_parse_keeps_reference_order() {
        // Arrange & Act
        let bundle = ImportBundle::parse(ted_bundle().as_bytes()).unwrap();
        let references = bundle.references().unwrap();

        // Assert
        assert_eq!(bundle.application_name(), "gitImport");
        let names: Vec<_> = references.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["TEDPostgres", "TEDMySQL", "TEDMongo"]);
        assert_eq!(references[1].datasource_type, DatasourceType::MySql);
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let result = ImportBundle::parse(b"{ not json");

        assert!(matches!(result, Err(ImportError::MalformedBundle(_))));
    }

    #[test]
    fn test_parse_rejects_unknown_plugin() {
        let payload = r#"{
            "exportedApplication": { "name": "app" },
            "datasourceList": [{ "name": "Sheets", "pluginId": "google-sheets-plugin" }]
        }"#;

        let result = ImportBundle::parse(payload.as_bytes());

        match result {
            Err(ImportError::MalformedBundle(msg)) => assert!(msg.contains("google-sheets-plugin")),
            other => panic!("expected MalformedBundle, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_empty_application_name() {
        let payload = r#"{ "exportedApplication": { "name": "  " } }"#;

        assert!(ImportBundle::parse(payload.as_bytes()).is_err());
    }

    #[test]
    fn test_identical_duplicates_collapse() {
        let payload = r#"{
            "exportedApplication": { "name": "app" },
            "datasourceList": [
                { "name": "Users", "pluginId": "postgres-plugin" },
                { "name": "Users", "pluginId": "postgres-plugin" }
            ]
        }"#;

        let bundle = ImportBundle::parse(payload.as_bytes()).unwrap();

        assert_eq!(bundle.references().unwrap().len(), 1);
    }

    #[test]
    fn test_conflicting_duplicates_are_malformed() {
        let payload = r#"{
            "exportedApplication": { "name": "app" },
            "datasourceList": [
                { "name": "Users", "pluginId": "postgres-plugin" },
                { "name": "Users", "pluginId": "mongo-plugin" }
            ]
        }"#;

        assert!(matches!(
            ImportBundle::parse(payload.as_bytes()),
            Err(ImportError::MalformedBundle(_))
        ));
    }

    #[test]
    fn test_plugin_id_round_trips_for_every_type() {
        for datasource_type in DatasourceType::get_all() {
            assert_eq!(
                DatasourceType::from_plugin_id(datasource_type.plugin_id()),
                Some(datasource_type)
            );
        }
    }
}
