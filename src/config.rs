//! Environment-based Configuration for the CAS vault server
//!
//! Loads a `CasVaultConfig` from environment variables, matching the
//! server's composition root needs: which node-store / metadata-store
//! backends to wire up, the B-Tree node size limit, and logging.
//!
//! # Environment Variables
//!
//! - `CASVAULT_BIND_ADDR` — HTTP bind address (default `0.0.0.0:8080`)
//! - `CASVAULT_NODE_LIMIT` — max bytes per CAS node, `nodeLimit` in the
//!   topology formulas (default 65536)
//! - `CASVAULT_STORE_BACKEND` — `memory` | `local-fs` (default `memory`)
//! - `CASVAULT_STORE_DIR` — root directory for `local-fs` (required if
//!   that backend is selected)
//! - `CASVAULT_METADATA_BACKEND` — `memory` | `sqlite` (default `memory`)
//! - `CASVAULT_SQLITE_PATH` — path to the sqlite database file (required if
//!   that backend is selected)
//! - `CASVAULT_MAX_DEPOT_HISTORY` — system ceiling for a depot's
//!   `maxHistory` (default 100)
//! - `CASVAULT_MAX_REWRITE_ENTRIES` — `FS_MAX_REWRITE_ENTRIES` (default 1000)
//! - `CASVAULT_LOG_LEVEL` — trace|debug|info|warn|error (default info)
//! - `CASVAULT_LOG_JSON` — "1" to force JSON log output

use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Which `NodeStore` implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    LocalFs,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "local-fs" | "local_fs" | "localfs" => Ok(StoreBackend::LocalFs),
            _ => Err(ConfigError::InvalidValue(
                "CASVAULT_STORE_BACKEND".to_string(),
                format!("unknown backend: {s}"),
            )),
        }
    }
}

/// Which `MetadataStore` implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataBackend {
    Memory,
    Sqlite,
}

impl FromStr for MetadataBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(MetadataBackend::Memory),
            "sqlite" => Ok(MetadataBackend::Sqlite),
            _ => Err(ConfigError::InvalidValue(
                "CASVAULT_METADATA_BACKEND".to_string(),
                format!("unknown backend: {s}"),
            )),
        }
    }
}

/// Main configuration struct.
#[derive(Debug, Clone)]
pub struct CasVaultConfig {
    pub bind_addr: String,
    pub node_limit: u32,
    pub store_backend: StoreBackend,
    pub store_dir: Option<String>,
    pub metadata_backend: MetadataBackend,
    pub sqlite_path: Option<String>,
    pub max_depot_history: usize,
    pub max_rewrite_entries: usize,
    pub log_level: String,
    pub log_json: bool,
}

impl CasVaultConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr =
            env::var("CASVAULT_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let node_limit: u32 = env::var("CASVAULT_NODE_LIMIT")
            .ok()
            .map(|v| {
                v.parse().map_err(|_| {
                    ConfigError::InvalidValue(
                        "CASVAULT_NODE_LIMIT".to_string(),
                        "must be a positive integer".to_string(),
                    )
                })
            })
            .transpose()?
            .unwrap_or(65536);

        let store_backend: StoreBackend = env::var("CASVAULT_STORE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .parse()?;

        let store_dir = env::var("CASVAULT_STORE_DIR").ok();
        if store_backend == StoreBackend::LocalFs && store_dir.is_none() {
            return Err(ConfigError::MissingEnvVar("CASVAULT_STORE_DIR".to_string()));
        }

        let metadata_backend: MetadataBackend = env::var("CASVAULT_METADATA_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .parse()?;

        let sqlite_path = env::var("CASVAULT_SQLITE_PATH").ok();
        if metadata_backend == MetadataBackend::Sqlite && sqlite_path.is_none() {
            return Err(ConfigError::MissingEnvVar("CASVAULT_SQLITE_PATH".to_string()));
        }

        let max_depot_history: usize = env::var("CASVAULT_MAX_DEPOT_HISTORY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        let max_rewrite_entries: usize = env::var("CASVAULT_MAX_REWRITE_ENTRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000);

        let log_level = env::var("CASVAULT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("CASVAULT_LOG_JSON").map(|v| v == "1").unwrap_or(false);

        Ok(Self {
            bind_addr,
            node_limit,
            store_backend,
            store_dir,
            metadata_backend,
            sqlite_path,
            max_depot_history,
            max_rewrite_entries,
            log_level,
            log_json,
        })
    }

    /// Print a summary of the active configuration (no secrets to hide —
    /// this layer carries no signer keys or other credentials).
    pub fn print_summary(&self) {
        println!("=== casvault configuration ===");
        println!("Bind address: {}", self.bind_addr);
        println!("Node limit: {} bytes", self.node_limit);
        println!("Store backend: {:?}", self.store_backend);
        println!("Metadata backend: {:?}", self.metadata_backend);
        println!("Max depot history: {}", self.max_depot_history);
        println!("Max rewrite entries: {}", self.max_rewrite_entries);
        println!("Log level: {}", self.log_level);
        println!("===============================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_parsing() {
        assert!(matches!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory)));
        assert!(matches!("local-fs".parse::<StoreBackend>(), Ok(StoreBackend::LocalFs)));
        assert!("bogus".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_metadata_backend_parsing() {
        assert!(matches!("sqlite".parse::<MetadataBackend>(), Ok(MetadataBackend::Sqlite)));
        assert!("bogus".parse::<MetadataBackend>().is_err());
    }
}
