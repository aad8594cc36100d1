//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum chunk size in bytes.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Upload session lifetime in seconds, counted from start.
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    /// Deadline in seconds for one completion (assembly, verification, catalog write).
    #[serde(default = "default_completion_timeout_secs")]
    pub completion_timeout_secs: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_chunk_size() -> u64 {
    crate::DEFAULT_MAX_CHUNK_SIZE
}

fn default_upload_timeout_secs() -> u64 {
    86400 // 24 hours
}

fn default_completion_timeout_secs() -> u64 {
    600
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_chunk_size: default_max_chunk_size(),
            upload_timeout_secs: default_upload_timeout_secs(),
            completion_timeout_secs: default_completion_timeout_secs(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Get the upload session lifetime as a Duration.
    pub fn upload_timeout(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.upload_timeout_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Get the completion deadline as a std::time::Duration.
    pub fn completion_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.completion_timeout_secs)
    }
}

/// Object store backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// Process-local memory. Contents are lost on restart.
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/releases"),
        }
    }
}

fn default_scratch_config() -> StorageConfig {
    StorageConfig::Filesystem {
        path: PathBuf::from("./data/scratch"),
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only, slow queries are logged).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/catalog.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

/// Session janitor configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Run the periodic sweep (default: true).
    #[serde(default = "default_janitor_enabled")]
    pub enabled: bool,
    /// Seconds between sweeps.
    #[serde(default = "default_janitor_interval_secs")]
    pub interval_secs: u64,
    /// How long completed or aborted sessions linger before deletion.
    #[serde(default = "default_janitor_grace_period_secs")]
    pub grace_period_secs: u64,
}

fn default_janitor_enabled() -> bool {
    true
}

fn default_janitor_interval_secs() -> u64 {
    300 // 5 minutes
}

fn default_janitor_grace_period_secs() -> u64 {
    3600 // 1 hour
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_janitor_enabled(),
            interval_secs: default_janitor_interval_secs(),
            grace_period_secs: default_janitor_grace_period_secs(),
        }
    }
}

impl JanitorConfig {
    /// Get the grace period as a Duration.
    pub fn grace_period(&self) -> Duration {
        let secs = i64::try_from(self.grace_period_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Get the sweep interval as a std::time::Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Durable store for assembled release blobs.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Scratch store for chunks of in-flight uploads.
    #[serde(default = "default_scratch_config")]
    pub scratch: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Session janitor configuration.
    #[serde(default)]
    pub janitor: JanitorConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            scratch: default_scratch_config(),
            metadata: MetadataConfig::default(),
            janitor: JanitorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Create a test configuration.
    ///
    /// **For testing only.** Uses in-memory blob and chunk stores, a
    /// short completion deadline and no background janitor.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                max_chunk_size: 1024 * 1024,
                completion_timeout_secs: 30,
                ..ServerConfig::default()
            },
            storage: StorageConfig::Memory,
            scratch: StorageConfig::Memory,
            metadata: MetadataConfig::default(),
            janitor: JanitorConfig {
                enabled: false,
                ..JanitorConfig::default()
            },
        }
    }

    /// Reject settings that would break the server at runtime.
    pub fn validate(&self) -> crate::Result<()> {
        let zero = |name: &str| crate::Error::Config(format!("{name} must be greater than 0"));
        if self.server.max_chunk_size == 0 {
            return Err(zero("server.max_chunk_size"));
        }
        if self.server.upload_timeout_secs == 0 {
            return Err(zero("server.upload_timeout_secs"));
        }
        if self.server.completion_timeout_secs == 0 {
            return Err(zero("server.completion_timeout_secs"));
        }
        // tokio::time::interval panics on a zero period
        if self.janitor.enabled && self.janitor.interval_secs == 0 {
            return Err(zero("janitor.interval_secs"));
        }
        Ok(())
    }
}
