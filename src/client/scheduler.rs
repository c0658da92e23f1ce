//! Workload scheduler client (Marathon v2 REST API)
//!
//! The orchestrator only needs five calls: list, get, create, delete and a
//! relative scale. App ids are sent without the leading `/` Marathon adds.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, http_client, ClientError};
use crate::cluster::{CLUSTER_OPERATOR, MACHINE_CLASS_ATTRIBUTE};
use crate::config::{PortMapping, VolumeMount};

// ============================================================================
// Data structures (pure, no I/O)
// ============================================================================

/// An application as reported by the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: String,

    #[serde(default)]
    pub instances: u32,

    /// `[field, operator, value?]` triples
    #[serde(default)]
    pub constraints: Vec<Vec<String>>,

    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// A running (or starting) instance of an app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,

    #[serde(rename = "startedAt", default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl App {
    pub fn new(id: impl Into<String>, instances: u32) -> Self {
        Self {
            id: id.into(),
            instances,
            constraints: vec![],
            tasks: vec![],
        }
    }

    /// Pin the app to a machine class
    pub fn on_machine(mut self, machine: &str) -> Self {
        self.constraints.push(machine_constraint(machine));
        self
    }

    /// The id without surrounding slashes
    pub fn name(&self) -> &str {
        self.id.trim_matches('/')
    }

    /// Machine class from the app's first constraint, if it is a
    /// `name CLUSTER <class>` constraint
    pub fn machine_class(&self) -> Option<&str> {
        match self.constraints.first()?.as_slice() {
            [field, operator, value]
                if field == MACHINE_CLASS_ATTRIBUTE && operator == CLUSTER_OPERATOR =>
            {
                Some(value.as_str())
            }
            _ => None,
        }
    }

    /// Exactly `expected` tasks exist and all of them have started
    pub fn is_converged(&self, expected: u32) -> bool {
        self.tasks.len() == expected as usize && self.tasks.iter().all(|t| t.started_at.is_some())
    }
}

/// Constraint pinning an app to a machine class
pub fn machine_constraint(machine: &str) -> Vec<String> {
    vec![
        MACHINE_CLASS_ATTRIBUTE.to_string(),
        CLUSTER_OPERATOR.to_string(),
        machine.to_string(),
    ]
}

/// Application definition submitted to the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDescriptor {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,

    pub cpus: f64,

    pub mem: f64,

    pub instances: u32,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub constraints: Vec<Vec<String>>,

    pub container: Container,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    #[serde(rename = "type")]
    pub container_type: String,

    pub docker: DockerSpec,

    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerSpec {
    pub image: String,

    /// `BRIDGE` or `HOST`
    pub network: String,

    #[serde(default)]
    pub port_mappings: Vec<PortMapping>,

    #[serde(default)]
    pub force_pull_image: bool,

    #[serde(default)]
    pub privileged: bool,

    /// Extra `docker run` flags
    #[serde(default)]
    pub parameters: Vec<DockerParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerParameter {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
struct AppList {
    #[serde(default)]
    apps: Vec<App>,
}

#[derive(Debug, Deserialize)]
struct AppEnvelope {
    app: App,
}

#[derive(Debug, Serialize)]
struct ScaleRequest {
    instances: u32,
}

/// Instance total after applying `delta`, never below zero
pub fn scaled_instances(current: u32, delta: i64) -> u32 {
    (current as i64 + delta).clamp(0, u32::MAX as i64) as u32
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn list_apps(&self) -> Result<Vec<App>, ClientError>;

    async fn get_app(&self, id: &str) -> Result<App, ClientError>;

    async fn create_app(&self, app: &AppDescriptor) -> Result<(), ClientError>;

    async fn delete_app(&self, id: &str, force: bool) -> Result<(), ClientError>;

    /// Change the instance count of an app by `delta`
    async fn scale_app(&self, id: &str, delta: i64, force: bool) -> Result<(), ClientError>;
}

// ============================================================================
// SBIO: I/O implementation (real HTTP client)
// ============================================================================

#[derive(Clone)]
pub struct MarathonClient {
    client: reqwest::Client,
    base_url: String,
}

impl MarathonClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn apps_url(&self) -> String {
        format!("{}/v2/apps", self.base_url.trim_end_matches('/'))
    }

    fn app_url(&self, id: &str) -> String {
        format!("{}/{}", self.apps_url(), id.trim_matches('/'))
    }
}

#[async_trait]
impl Scheduler for MarathonClient {
    async fn list_apps(&self) -> Result<Vec<App>, ClientError> {
        let response = self
            .client
            .get(self.apps_url())
            .query(&[("embed", "apps.tasks")])
            .send()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))?;

        let list: AppList = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        Ok(list.apps)
    }

    async fn get_app(&self, id: &str) -> Result<App, ClientError> {
        let response = self
            .client
            .get(self.app_url(id))
            .send()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(id.to_string()));
        }

        let envelope: AppEnvelope = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        Ok(envelope.app)
    }

    async fn create_app(&self, app: &AppDescriptor) -> Result<(), ClientError> {
        debug!("Creating app {}", app.id);
        let response = self
            .client
            .post(self.apps_url())
            .json(app)
            .send()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))?;

        check_status(response).await?;
        Ok(())
    }

    async fn delete_app(&self, id: &str, force: bool) -> Result<(), ClientError> {
        debug!("Deleting app {} (force={})", id, force);
        let response = self
            .client
            .delete(self.app_url(id))
            .query(&[("force", force)])
            .send()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(id.to_string()));
        }
        check_status(response).await?;
        Ok(())
    }

    async fn scale_app(&self, id: &str, delta: i64, force: bool) -> Result<(), ClientError> {
        let current = self.get_app(id).await?;
        let instances = scaled_instances(current.instances, delta);
        debug!(
            "Scaling app {} from {} to {} instances",
            id, current.instances, instances
        );

        let response = self
            .client
            .put(self.app_url(id))
            .query(&[("force", force)])
            .json(&ScaleRequest { instances })
            .send()
            .await
            .map_err(|e| ClientError::Http(e.to_string()))?;

        check_status(response).await?;
        Ok(())
    }
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================
