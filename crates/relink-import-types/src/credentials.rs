//! Credential forms supplied when reconnecting a datasource

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::bundle::DatasourceType;

const REDACTED: &str = "***";

/// Connection parameters for Postgres and MySQL
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SqlCredentials {
    #[schema(example = "localhost")]
    pub host: String,
    #[schema(example = 5432)]
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub ssl: bool,
}

impl SqlCredentials {
    fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host is required".to_string());
        }
        if self.port == 0 {
            return Err("port must be between 1 and 65535".to_string());
        }
        if self.database.trim().is_empty() {
            return Err("database is required".to_string());
        }
        if self.username.trim().is_empty() {
            return Err("username is required".to_string());
        }
        Ok(())
    }
}

impl std::fmt::Debug for SqlCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &REDACTED)
            .field("ssl", &self.ssl)
            .finish()
    }
}

/// Mongo accepts either a full connection URL or discrete host fields
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MongoCredentials {
    #[serde(default)]
    #[schema(example = "mongodb://localhost:27017/ted")]
    pub connection_url: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl MongoCredentials {
    fn validate(&self) -> Result<(), String> {
        match (&self.connection_url, &self.host) {
            (Some(_), Some(_)) => {
                Err("provide either connection_url or host, not both".to_string())
            }
            (None, None) => Err("connection_url or host is required".to_string()),
            (Some(url), None) => {
                if url.starts_with("mongodb://") || url.starts_with("mongodb+srv://") {
                    Ok(())
                } else {
                    Err("connection_url must use the mongodb:// or mongodb+srv:// scheme"
                        .to_string())
                }
            }
            (None, Some(host)) => {
                if host.trim().is_empty() {
                    return Err("host is required".to_string());
                }
                if self.port == Some(0) {
                    return Err("port must be between 1 and 65535".to_string());
                }
                if self.username.is_some() != self.password.is_some() {
                    return Err("username and password must be given together".to_string());
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for MongoCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoCredentials")
            .field("connection_url", &self.connection_url.as_ref().map(|_| REDACTED))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RestApiCredentials {
    #[schema(example = "https://api.example.com")]
    pub base_url: String,
    /// Sent with the probe request, e.g. an Authorization header
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl RestApiCredentials {
    fn validate(&self) -> Result<(), String> {
        let url = self.base_url.trim();
        if url.starts_with("http://") || url.starts_with("https://") {
            Ok(())
        } else {
            Err("base_url must start with http:// or https://".to_string())
        }
    }
}

impl std::fmt::Debug for RestApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestApiCredentials")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Filled-in credential form for one datasource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatasourceCredentials {
    Postgres(SqlCredentials),
    #[serde(rename = "mysql")]
    MySql(SqlCredentials),
    Mongo(MongoCredentials),
    #[serde(rename = "restapi")]
    RestApi(RestApiCredentials),
}

impl DatasourceCredentials {
    pub fn datasource_type(&self) -> DatasourceType {
        match self {
            DatasourceCredentials::Postgres(_) => DatasourceType::Postgres,
            DatasourceCredentials::MySql(_) => DatasourceType::MySql,
            DatasourceCredentials::Mongo(_) => DatasourceType::Mongo,
            DatasourceCredentials::RestApi(_) => DatasourceType::RestApi,
        }
    }

    /// Structural checks that need no network access
    pub fn validate(&self) -> Result<(), String> {
        match self {
            DatasourceCredentials::Postgres(c) | DatasourceCredentials::MySql(c) => c.validate(),
            DatasourceCredentials::Mongo(c) => c.validate(),
            DatasourceCredentials::RestApi(c) => c.validate(),
        }
    }
}
