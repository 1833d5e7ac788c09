//! TOML configuration for profiling and reconstruction

use std::path::Path;

use otter_vm_bytecode::DEFAULT_POLYMORPHIC_LIMIT;
use otter_vm_shape::{MAX_FAST_PROPERTIES, MAX_LITERAL_CACHE_LENGTH, ShapeStoreConfig};
use serde::{Deserialize, Serialize};

use crate::error::{PgoError, Result};

/// Default config file looked up by [`PgoConfig::load_or_default`]
pub const DEFAULT_CONFIG_FILE: &str = "otter_pgo.toml";

/// Who consumes the collected profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfilerMode {
    /// Offline profile for ahead-of-time compilation
    #[default]
    Baseline,
    /// In-process profile for the JIT
    Jit,
}

/// Profiling and reconstruction configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PgoConfig {
    /// Cache object-literal root shapes by literal length
    pub literal_cache: bool,

    /// Properties a shape may hold before falling back to dictionary mode
    pub max_fast_properties: u32,

    /// Longest literal whose root shape is cached
    pub max_literal_cache_length: u32,

    /// Feedback tuples kept per site before it is reported megamorphic
    pub max_polymorphic_entries: usize,

    /// Profile consumer
    pub mode: ProfilerMode,
}

impl Default for PgoConfig {
    fn default() -> Self {
        Self {
            literal_cache: true,
            max_fast_properties: MAX_FAST_PROPERTIES,
            max_literal_cache_length: MAX_LITERAL_CACHE_LENGTH,
            max_polymorphic_entries: DEFAULT_POLYMORPHIC_LIMIT,
            mode: ProfilerMode::Baseline,
        }
    }
}

impl PgoConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| PgoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| PgoError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` or the default location, falling back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "using default PGO configuration");
                Self::default()
            }
        }
    }

    /// The shape store's slice of the configuration
    pub fn shape_store_config(&self) -> ShapeStoreConfig {
        ShapeStoreConfig {
            max_fast_properties: self.max_fast_properties,
            max_literal_cache_length: self.max_literal_cache_length,
        }
    }

    /// Profile is collected for the JIT
    pub fn is_jit(&self) -> bool {
        self.mode == ProfilerMode::Jit
    }
}
