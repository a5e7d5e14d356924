use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml::Value;
use tracing::{debug, info};

pub const API_KEY_NAME: &str = "GOOGLE_API_KEY";
pub const DEFAULT_SECRETS_PATH: &str = ".secrets/secrets.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is not set in {} or the environment", path.display())]
    Missing { key: &'static str, path: PathBuf },

    #[error("{key} is set but empty")]
    Empty { key: &'static str },

    #[error("{key} in {} must be a string", path.display())]
    Invalid { key: &'static str, path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// The API key, loaded once at startup.
#[derive(Clone)]
pub struct Secrets {
    api_key: String,
}

impl Secrets {
    #[cfg(test)]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn into_api_key(self) -> String {
        self.api_key
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets").field("api_key", &"<redacted>").finish()
    }
}

/// Reads `GOOGLE_API_KEY` as the process environment currently has it.
pub fn api_key_from_env() -> Option<String> {
    env::var(API_KEY_NAME).ok()
}

/// Loads the API key from the secrets file, falling back to `from_env`.
/// The secrets file wins whenever it names the key, even with an empty value.
pub fn load_api_key(path: &Path, from_env: Option<String>) -> Result<Secrets, ConfigError> {
    let value = match read_secrets_file(path)? {
        Some(value) => {
            info!("Using {} from {}", API_KEY_NAME, path.display());
            value
        }
        None => {
            let Some(value) = from_env else {
                return Err(ConfigError::Missing {
                    key: API_KEY_NAME,
                    path: path.to_path_buf(),
                });
            };
            info!("Using {} from the environment", API_KEY_NAME);
            value
        }
    };

    let api_key = value.trim();
    if api_key.is_empty() {
        return Err(ConfigError::Empty { key: API_KEY_NAME });
    }

    Ok(Secrets {
        api_key: api_key.to_string(),
    })
}

fn read_secrets_file(path: &Path) -> Result<Option<String>, ConfigError> {
    if !path.exists() {
        debug!("No secrets file at {}", path.display());
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let table: toml::Table = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    match table.get(API_KEY_NAME) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(ConfigError::Invalid {
            key: API_KEY_NAME,
            path: path.to_path_buf(),
        }),
    }
}
