//! Ingestion service configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default number of rows committed per batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default upload limit per request: 1GB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1024 * 1024 * 1024;

/// Name of the scratch directory created under the system temp dir
pub const DEFAULT_SCRATCH_DIR_NAME: &str = "chaingraph_uploads";

/// Which graph store backs the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Remote SurrealDB over HTTP
    Surreal,
    /// Process-local store (nothing survives a restart)
    Memory,
}

impl StoreBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "surreal" | "surrealdb" => Some(Self::Surreal),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Configuration for the ingestion pipeline and its HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Root under which each request gets its own staging directory.
    pub scratch_dir: PathBuf,

    /// Rows per committed batch (nodes and relationships alike).
    pub batch_size: usize,

    /// Upper bound on the bytes accepted for a single staged file.
    pub max_upload_bytes: u64,

    /// Graph store implementation.
    pub store_backend: StoreBackend,

    /// HTTP port.
    pub server_port: u16,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join(DEFAULT_SCRATCH_DIR_NAME),
            batch_size: DEFAULT_BATCH_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            store_backend: StoreBackend::Surreal,
            server_port: 3000,
        }
    }
}

impl IngestConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set scratch directory.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Builder: set batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Builder: set maximum upload size.
    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes.max(1);
        self
    }

    /// Builder: set store backend.
    pub fn with_store_backend(mut self, backend: StoreBackend) -> Self {
        self.store_backend = backend;
        self
    }

    /// Creates configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SCRATCH_DIR") {
            if !val.trim().is_empty() {
                config.scratch_dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("INGEST_BATCH_SIZE") {
            if let Ok(size) = val.parse::<usize>() {
                config.batch_size = size.max(1);
            }
        }

        if let Ok(val) = std::env::var("MAX_UPLOAD_BYTES") {
            if let Ok(bytes) = val.parse::<u64>() {
                config.max_upload_bytes = bytes.max(1);
            }
        }

        if let Ok(val) = std::env::var("STORE_BACKEND") {
            if let Some(backend) = StoreBackend::parse(&val) {
                config.store_backend = backend;
            }
        }

        if let Ok(val) = std::env::var("SERVER_PORT") {
            if let Ok(port) = val.parse::<u16>() {
                config.server_port = port;
            }
        }

        config
    }
}
