use std::path::{Path, PathBuf};

use gridlife_core::{SimConfig, WorldError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config at `{path}`: {message}")]
    Parse { path: String, message: String },
    #[error(transparent)]
    Invalid(#[from] WorldError),
}

/// Load a JSON config file. Missing fields fall back to defaults; errors
/// name the offending field path.
pub fn load_config(path: &Path) -> Result<SimConfig, ConfigLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<SimConfig, ConfigLoadError> {
    let deserializer = &mut serde_json::Deserializer::from_str(raw);
    let config: SimConfig =
        serde_path_to_error::deserialize(deserializer).map_err(|err| ConfigLoadError::Parse {
            path: err.path().to_string(),
            message: err.inner().to_string(),
        })?;
    config.validate()?;
    Ok(config)
}
