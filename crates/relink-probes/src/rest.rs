use async_trait::async_trait;
use relink_import_types::{ConnectivityProbe, DatasourceCredentials, DatasourceType, ProbeError};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

/// Treats any answer below 500 as reachable, except 401/403
pub struct RestApiProbe {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl RestApiProbe {
    pub fn new(connect_timeout: Duration) -> Self {
        let request_timeout = connect_timeout * 2;
        let client = match reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                // Requests still carry request_timeout below
                warn!(
                    "Failed to build REST probe client, using defaults without a connect timeout: {}",
                    e
                );
                reqwest::Client::new()
            }
        };
        Self {
            client,
            request_timeout,
        }
    }
}

#[async_trait]
impl ConnectivityProbe for RestApiProbe {
    fn datasource_type(&self) -> DatasourceType {
        DatasourceType::RestApi
    }

    async fn probe(&self, credentials: &DatasourceCredentials) -> Result<(), ProbeError> {
        let DatasourceCredentials::RestApi(c) = credentials else {
            return Err(ProbeError::UnsupportedCredentials(format!(
                "rest api probe received {} credentials",
                credentials.datasource_type()
            )));
        };

        debug!("Probing REST API: {}", c.base_url);

        let mut request = self
            .client
            .get(c.base_url.trim())
            .timeout(self.request_timeout);
        for (name, value) in &c.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProbeError::ConnectionFailed(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                ProbeError::AuthenticationFailed(format!("server answered {}", response.status())),
            ),
            status if status.is_server_error() => Err(ProbeError::ConnectionFailed(format!(
                "server answered {}",
                status
            ))),
            status => {
                debug!("REST API probe got {} from {}", status, c.base_url);
                Ok(())
            }
        }
    }
}
