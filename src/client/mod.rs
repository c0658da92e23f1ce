pub mod inventory;
pub mod scheduler;

pub use inventory::{InventorySource, MesosClient};
pub use scheduler::{
    App, AppDescriptor, Container, DockerParameter, DockerSpec, MarathonClient, Scheduler, Task,
};

use std::time::Duration;

use thiserror::Error;

/// Default timeout for inventory and scheduler requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Parse(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Application '{0}' not found")]
    NotFound(String),
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::Http(e.to_string()))
}

/// Turn a non-success response into `ClientError::Api`
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
