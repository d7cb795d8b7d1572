//! Postgres and MySQL probes backed by sqlx

use async_trait::async_trait;
use relink_import_types::{
    ConnectivityProbe, DatasourceCredentials, DatasourceType, ProbeError, SqlCredentials,
};
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::{ConnectOptions, Connection};
use std::time::Duration;
use tracing::debug;

/// SQLSTATE class 28 is "invalid authorization specification" on both servers
fn classify(err: sqlx::Error) -> ProbeError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) if code.starts_with("28") => {
                ProbeError::AuthenticationFailed(db_err.message().to_string())
            }
            _ => ProbeError::ConnectionFailed(db_err.message().to_string()),
        },
        sqlx::Error::PoolTimedOut => ProbeError::ConnectionFailed("connection timed out".into()),
        other => ProbeError::ConnectionFailed(other.to_string()),
    }
}

fn postgres_options(c: &SqlCredentials) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&c.host)
        .port(c.port)
        .username(&c.username)
        .password(&c.password)
        .database(&c.database)
        .ssl_mode(if c.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        })
}

fn mysql_options(c: &SqlCredentials) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&c.host)
        .port(c.port)
        .username(&c.username)
        .password(&c.password)
        .database(&c.database)
        .ssl_mode(if c.ssl {
            MySqlSslMode::Required
        } else {
            MySqlSslMode::Preferred
        })
}

async fn with_timeout<F, T>(connect_timeout: Duration, fut: F) -> Result<T, ProbeError>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    tokio::time::timeout(connect_timeout, fut)
        .await
        .map_err(|_| {
            ProbeError::ConnectionFailed(format!(
                "no answer within {}s",
                connect_timeout.as_secs()
            ))
        })?
        .map_err(classify)
}

pub struct PostgresProbe {
    connect_timeout: Duration,
}

impl PostgresProbe {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl ConnectivityProbe for PostgresProbe {
    fn datasource_type(&self) -> DatasourceType {
        DatasourceType::Postgres
    }

    async fn probe(&self, credentials: &DatasourceCredentials) -> Result<(), ProbeError> {
        let DatasourceCredentials::Postgres(c) = credentials else {
            return Err(ProbeError::UnsupportedCredentials(format!(
                "postgres probe received {} credentials",
                credentials.datasource_type()
            )));
        };

        debug!(
            "Probing PostgreSQL: {}@{}:{}/{}",
            c.username, c.host, c.port, c.database
        );

        let mut conn = with_timeout(self.connect_timeout, postgres_options(c).connect()).await?;
        sqlx::query("SELECT 1")
            .execute(&mut conn)
            .await
            .map_err(classify)?;
        conn.close().await.map_err(classify)?;

        debug!("PostgreSQL probe succeeded for {}", c.host);
        Ok(())
    }
}

pub struct MySqlProbe {
    connect_timeout: Duration,
}

impl MySqlProbe {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl ConnectivityProbe for MySqlProbe {
    fn datasource_type(&self) -> DatasourceType {
        DatasourceType::MySql
    }

    async fn probe(&self, credentials: &DatasourceCredentials) -> Result<(), ProbeError> {
        let DatasourceCredentials::MySql(c) = credentials else {
            return Err(ProbeError::UnsupportedCredentials(format!(
                "mysql probe received {} credentials",
                credentials.datasource_type()
            )));
        };

        debug!(
            "Probing MySQL: {}@{}:{}/{}",
            c.username, c.host, c.port, c.database
        );

        let mut conn = with_timeout(self.connect_timeout, mysql_options(c).connect()).await?;
        sqlx::query("SELECT 1")
            .execute(&mut conn)
            .await
            .map_err(classify)?;
        conn.close().await.map_err(classify)?;

        debug!("MySQL probe succeeded for {}", c.host);
        Ok(())
    }
}
