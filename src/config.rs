//! Configuration management for the EDPS mock server

use std::env;
use std::path::PathBuf;

use crate::upload::DEFAULT_CHUNK_SIZE;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Files served by `GET /files/*` and written by the analysis job mock
    pub data_dir: PathBuf,
    /// Destination of `POST /upload`
    pub results_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Read buffer size used while draining a request body
    pub chunk_size: usize,
    /// Name used when the request carries no file name at all
    pub default_file_name: String,
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("./data"),
                results_dir: PathBuf::from("./results"),
            },
            upload: UploadConfig {
                chunk_size: DEFAULT_CHUNK_SIZE,
                default_file_name: "data_eps.zip".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from `lookup`, falling back to defaults for unset names
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let port = match lookup("SERVER_PORT") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { name: "SERVER_PORT", value })?,
            None => defaults.server.port,
        };

        let chunk_size = match lookup("UPLOAD_CHUNK_SIZE") {
            Some(value) => match value.parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => return Err(ConfigError::Invalid { name: "UPLOAD_CHUNK_SIZE", value }),
            },
            None => defaults.upload.chunk_size,
        };

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port,
            },
            storage: StorageConfig {
                data_dir: lookup("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.data_dir),
                results_dir: lookup("RESULTS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.results_dir),
            },
            upload: UploadConfig {
                chunk_size,
                default_file_name: lookup("DEFAULT_UPLOAD_NAME")
                    .unwrap_or(defaults.upload.default_file_name),
            },
        })
    }
}
