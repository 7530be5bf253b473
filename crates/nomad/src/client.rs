use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{NomadError, Result};
use crate::types::{DeregisterResponse, NomadConfig};

const TOKEN_HEADER: &str = "X-Nomad-Token";

/// The subset of the Nomad API this system drives.
#[async_trait]
pub trait NomadClient: Send + Sync {
    /// Stops a job. With `purge = false` Nomad keeps the job around so its
    /// history stays queryable.
    async fn deregister_job(&self, job_id: &str, purge: bool) -> Result<DeregisterResponse>;
}

pub struct HttpNomadClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl HttpNomadClient {
    pub fn new(config: &NomadConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NomadError::Config(e.to_string()))?;

        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &NomadConfig, client: Client) -> Self {
        Self {
            base_url: config.address.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        }
    }
}

#[async_trait]
impl NomadClient for HttpNomadClient {
    async fn deregister_job(&self, job_id: &str, purge: bool) -> Result<DeregisterResponse> {
        debug!(job_id, purge, "Deregistering Nomad job");

        let mut request = self
            .client
            .delete(format!("{}/v1/job/{}", self.base_url, job_id))
            .query(&[("purge", purge)]);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NomadError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let deregistered: DeregisterResponse = response.json().await?;
        info!(job_id, eval_id = %deregistered.eval_id, "Deregistered Nomad job");
        Ok(deregistered)
    }
}
