pub mod environment;
pub mod validation;

pub use environment::{
    parse_environment, ComponentSpec, EnvironmentFile, EnvironmentSpec, ImageSpec,
    ResourcePolicy, SpecError, TunnelEntry, TunnelExposure,
};
pub use validation::{
    parse_dependencies, parse_ports, parse_volume, tunnel_specs, validate_environment,
    PortMapping, TunnelSpec, VolumeMount,
};

use std::path::Path;
use thiserror::Error;

/// Errors for file I/O operations (separate from pure parsing errors)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Environment error: {0}")]
    SpecError(#[from] SpecError),
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

/// Load, parse and validate an environment file from disk.
/// Relative paths inside the file resolve against its directory.
pub fn load_environment_file(path: &Path) -> Result<EnvironmentFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let environment = EnvironmentFile::from_str_in(&content, base_dir)?;
    validate_environment(&environment)?;
    Ok(environment)
}
