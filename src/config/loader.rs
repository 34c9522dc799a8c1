//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable naming the listen port.
pub const PORT_ENV: &str = "PORT";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid port '{0}': expected an integer between 0 and 65535")]
    InvalidPort(String),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Values given on the command line. They win over every other source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub watch: bool,
    pub in_memory: bool,
}

/// Parse a raw `PORT` value. Unset or blank means "use the configured port".
pub fn parse_port(raw: Option<&str>) -> Result<Option<u16>, ConfigError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<u16>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidPort(value.to_string())),
    }
}

/// Read a TOML file. Missing sections and fields take their defaults.
///
/// The result is not validated; `resolve_config` validates once every
/// source has been applied.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Layer every source: defaults < file < `PORT` < command line.
pub fn resolve_config(
    file: Option<&Path>,
    port_env: Option<&str>,
    overrides: &Overrides,
) -> Result<ServerConfig, ConfigError> {
    let mut config = match file {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    if let Some(port) = parse_port(port_env)? {
        config.listener.port = port;
    }

    if let Some(port) = overrides.port {
        config.listener.port = port;
    }
    if let Some(path) = &overrides.db_path {
        config.store.path = path.to_string_lossy().into_owned();
    }
    if overrides.watch {
        config.store.watch = true;
    }
    if overrides.in_memory {
        config.store.in_memory = true;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
