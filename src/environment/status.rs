//! Queries over what the scheduler is currently running

use std::collections::HashMap;

use serde::Serialize;

use super::{Environment, EnvironmentError};
use crate::client::App;

/// An app pinned to a machine class
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningComponent {
    pub app_id: String,
    pub instance_count: u32,
}

/// Group apps by the machine class their first constraint pins them to.
/// Apps without a machine constraint are left out.
pub fn group_by_machine(apps: &[App]) -> HashMap<String, Vec<RunningComponent>> {
    let mut grouped: HashMap<String, Vec<RunningComponent>> = HashMap::new();
    for app in apps {
        if let Some(machine) = app.machine_class() {
            grouped
                .entry(machine.to_string())
                .or_default()
                .push(RunningComponent {
                    app_id: app.id.clone(),
                    instance_count: app.instances,
                });
        }
    }
    grouped
}

impl Environment {
    /// Running components keyed by machine class
    pub async fn running_components_by_machine(
        &self,
    ) -> Result<HashMap<String, Vec<RunningComponent>>, EnvironmentError> {
        let apps = self.scheduler.list_apps().await?;
        Ok(group_by_machine(&apps))
    }

    /// Instance count per running component name
    pub async fn running_component_counts(&self) -> Result<HashMap<String, u32>, EnvironmentError> {
        let apps = self.scheduler.list_apps().await?;
        let mut counts = HashMap::new();
        for app in &apps {
            *counts.entry(app.name().to_string()).or_insert(0) += app.instances;
        }
        Ok(counts)
    }

    /// Names of every app the scheduler knows about
    pub(crate) async fn running_app_names(&self) -> Result<Vec<String>, EnvironmentError> {
        Ok(self
            .scheduler
            .list_apps()
            .await?
            .iter()
            .map(|app| app.name().to_string())
            .collect())
    }
}
