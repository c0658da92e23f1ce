use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{Environment, EnvironmentError, OperationStatus};

/// Result of tearing down every scheduler app
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestroyOutcome {
    NothingToDestroy,
    Destroyed { count: usize },
    /// Some apps were still listed when the destroy timeout passed
    TimedOut { requested: usize, remaining: usize },
}

impl DestroyOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, DestroyOutcome::TimedOut { .. })
    }

    pub fn into_status(self) -> OperationStatus {
        match self {
            DestroyOutcome::NothingToDestroy => OperationStatus::success("No application to destroy"),
            DestroyOutcome::Destroyed { count } => OperationStatus::success(format!(
                "{} running applications successfully destroyed",
                count
            )),
            DestroyOutcome::TimedOut {
                requested,
                remaining,
            } => OperationStatus::failure(format!(
                "Could not delete all applications ({} of {} removed)",
                requested.saturating_sub(remaining),
                requested
            ))
            .with_details(json!({ "requested": requested, "remaining": remaining })),
        }
    }
}

impl Environment {
    /// Force-delete every app the scheduler runs and wait until none are
    /// listed.
    pub async fn destroy(&self) -> Result<DestroyOutcome, EnvironmentError> {
        let apps = self.scheduler.list_apps().await?;
        if apps.is_empty() {
            info!("No application to destroy");
            return Ok(DestroyOutcome::NothingToDestroy);
        }

        let requested = apps.len();
        for app in &apps {
            self.scheduler.delete_app(&app.id, true).await?;
        }
        debug!("Sent delete requests, will wait until all destroyed");

        let deadline = Instant::now() + self.config.destroy_timeout;
        let remaining = loop {
            let remaining = self.scheduler.list_apps().await?.len();
            if remaining == 0 {
                debug!("All apps destroyed");
                break 0;
            }
            if Instant::now() >= deadline {
                break remaining;
            }
            sleep(self.config.destroy_poll_interval).await;
        };

        if remaining > 0 {
            warn!(
                "Could not delete all applications ({} of {} still running)",
                remaining, requested
            );
            return Ok(DestroyOutcome::TimedOut {
                requested,
                remaining,
            });
        }

        info!("{} running applications successfully destroyed", requested);
        Ok(DestroyOutcome::Destroyed { count: requested })
    }
}
