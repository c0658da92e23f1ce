//! Node-inventory client (Mesos master state endpoint)

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{check_status, http_client, ClientError};
use crate::cluster::InventoryState;

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Fetch the raw node records of the cluster
    async fn state(&self) -> Result<InventoryState, ClientError>;
}

// ============================================================================
// SBIO: I/O implementation (real HTTP client)
// ============================================================================

#[derive(Clone)]
pub struct MesosClient {
    client: reqwest::Client,
    base_url: String,
}

impl MesosClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl InventorySource for MesosClient {
    async fn state(&self) -> Result<InventoryState, ClientError> {
        let url = format!("{}/master/state.json", self.base_url.trim_end_matches('/'));
        debug!("Querying inventory at {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================
