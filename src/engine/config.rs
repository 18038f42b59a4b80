//! Store configuration.
//!
//! All fields have defaults, so an empty TOML document is a valid config:
//!
//! ```toml
//! initial_entity_capacity = 4096
//! worker_threads = 4
//! min_parallel_chunk_len = 512
//! reusable_command_buffers = true
//! ```

use serde::{Deserialize, Serialize};

use crate::engine::error::ConfigError;

/// Tunables for a [`Store`](crate::Store) and its [`JobRunner`](crate::JobRunner).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Node table reservation at store creation.
    pub initial_entity_capacity: usize,
    /// Worker pool size for parallel jobs; `0` uses the available parallelism.
    pub worker_threads: usize,
    /// Sub-ranges at or below this many rows run on the caller thread.
    pub min_parallel_chunk_len: usize,
    /// Whether `CommandBuffer::new` creates reusable buffers.
    pub reusable_command_buffers: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_entity_capacity: 1024,
            worker_threads: 0,
            min_parallel_chunk_len: 1024,
            reusable_command_buffers: false,
        }
    }
}

impl StoreConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Worker count with `0` resolved to the available parallelism.
    pub fn resolved_worker_threads(&self) -> usize {
        match self.worker_threads {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        }
    }
}
