//! Configuration management for chunkcopy

use crate::error::{Error, Result};
use crate::transfer::{
    AccessPolicy, IsolationStrategy, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONCURRENT_CHUNKS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default chunk size: 8 MiB (balance between memory use and disk I/O for large files)
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Largest chunk size accepted from configuration: 1 GiB
pub const MAX_CHUNK_SIZE: u64 = 1024 * 1024 * 1024;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Chunk configuration
    pub chunk: ChunkConfig,

    /// Transfer configuration
    pub transfer: TransferConfig,
}

/// Chunk configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkConfig {
    /// Chunk size in bytes
    pub chunk_size: u64,
}

/// Transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransferConfig {
    /// Maximum chunks in flight
    pub max_concurrent_chunks: usize,

    /// Write/verify attempts per chunk
    pub max_attempts: u32,

    /// How workers share the destination file
    pub isolation: IsolationStrategy,

    /// Discard existing destination content before copying
    pub truncate_destination: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chunk: ChunkConfig::default(),
            transfer: TransferConfig::default(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            max_concurrent_chunks: DEFAULT_MAX_CONCURRENT_CHUNKS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            isolation: IsolationStrategy::SharedHandle,
            truncate_destination: true,
        }
    }
}

impl Config {
    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chunkcopy")
            .join("config.json")
    }

    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        // Override with environment variables if set
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise start from defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Config::load(path);
        }

        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(chunk_size) = std::env::var("CHUNKCOPY_CHUNK_SIZE") {
            if let Ok(size) = chunk_size.trim().parse::<u64>() {
                self.chunk.chunk_size = size;
            }
        }

        if let Ok(workers) = std::env::var("CHUNKCOPY_MAX_WORKERS") {
            if let Ok(n) = workers.trim().parse::<usize>() {
                self.transfer.max_concurrent_chunks = n;
            }
        }

        if let Ok(attempts) = std::env::var("CHUNKCOPY_MAX_ATTEMPTS") {
            if let Ok(n) = attempts.trim().parse::<u32>() {
                self.transfer.max_attempts = n;
            }
        }
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk.chunk_size == 0 {
            return Err(Error::InvalidConfiguration(
                "Chunk size must be greater than 0".to_string(),
            ));
        }

        if self.chunk.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::InvalidConfiguration(format!(
                "Chunk size exceeds the {} byte limit",
                MAX_CHUNK_SIZE
            )));
        }

        self.access_policy().validate()
    }

    /// Access policy handed to the transfer orchestrator
    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            max_concurrent_chunks: self.transfer.max_concurrent_chunks,
            isolation: self.transfer.isolation,
            max_attempts: self.transfer.max_attempts,
            truncate_destination: self.transfer.truncate_destination,
        }
    }
}
