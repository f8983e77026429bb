//! Configuration module for the vector store.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CV_` and use double underscores
//! to separate nested levels:
//! - `CV_HNSW__EF_SEARCH=100` sets `hnsw.ef_search`
//! - `CV_GIT__TIMEOUT_SECS=2` sets `git.timeout_secs`
//! - `CV_STORAGE__DEPTH_FACTOR=3` sets `storage.depth_factor`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-workspace configuration directory
pub const CONFIG_DIR: &str = ".codevec";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding one subdirectory per collection
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Workspace root directory (where .codevec is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// On-disk layout settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// ANN index construction and query settings
    #[serde(default)]
    pub hnsw: HnswConfig,

    /// Version-control collaborator settings
    #[serde(default)]
    pub git: GitConfig,

    /// Search defaults
    #[serde(default)]
    pub search: SearchConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How reduced vector components are bucketed into 2-bit symbols
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuantizationStrategy {
    /// Fixed analytic range stored in the collection metadata
    Range,
    /// Per-vector quartile thresholds
    Quartile,
}

/// Distance metric of the ANN index
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceSpace {
    Cosine,
    L2,
    Ip,
}

impl DistanceSpace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::Ip => "ip",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Number of 2-character directory levels derived from the quantized hex
    #[serde(default = "default_depth_factor")]
    pub depth_factor: usize,

    /// Output dimension of the random projection
    #[serde(default = "default_reduced_dim")]
    pub reduced_dim: usize,

    /// Bucketing strategy for quantization
    #[serde(default = "default_quantization")]
    pub quantization: QuantizationStrategy,

    /// Maintain the legacy Hamming-distance candidate index
    #[serde(default = "default_false")]
    pub legacy_index: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HnswConfig {
    /// Graph connectivity (M)
    #[serde(default = "default_hnsw_m")]
    pub m: usize,

    /// Construction quality (ef_construction)
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    /// Default query-time accuracy knob
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,

    /// Distance metric
    #[serde(default = "default_space")]
    pub space: DistanceSpace,

    /// Above this share of changed points a session end rebuilds from scratch
    #[serde(default = "default_incremental_max_ratio")]
    pub incremental_max_ratio: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitConfig {
    /// Use git to decide between blob-hash and literal content storage
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Timeout for a single git invocation in seconds
    #[serde(default = "default_git_timeout")]
    pub timeout_secs: u64,

    /// Maximum number of paths passed to one git invocation
    #[serde(default = "default_git_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Number of results when the caller does not specify one
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    /// Minimum similarity score applied when the caller does not specify one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f32>,

    /// Minimum number of ANN candidates fetched before exact re-scoring
    #[serde(default)]
    pub prefetch_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".codevec/index")
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_depth_factor() -> usize {
    4
}
fn default_reduced_dim() -> usize {
    64
}
fn default_quantization() -> QuantizationStrategy {
    QuantizationStrategy::Range
}
fn default_hnsw_m() -> usize {
    16
}
fn default_ef_construction() -> usize {
    200
}
fn default_ef_search() -> usize {
    50
}
fn default_space() -> DistanceSpace {
    DistanceSpace::Cosine
}
fn default_incremental_max_ratio() -> f32 {
    0.5
}
fn default_git_timeout() -> u64 {
    5
}
fn default_git_batch_size() -> usize {
    100
}
fn default_search_limit() -> usize {
    10
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            workspace_root: None,
            debug: false,
            storage: StorageConfig::default(),
            hnsw: HnswConfig::default(),
            git: GitConfig::default(),
            search: SearchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            depth_factor: default_depth_factor(),
            reduced_dim: default_reduced_dim(),
            quantization: default_quantization(),
            legacy_index: false,
        }
    }
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: default_hnsw_m(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
            space: default_space(),
            incremental_max_ratio: default_incremental_max_ratio(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_git_timeout(),
            batch_size: default_git_batch_size(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            score_threshold: None,
            prefetch_limit: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscore stays
            .merge(Env::prefixed("CV_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the workspace config by looking for a .codevec directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .codevec is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'codevec init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Index directory resolved against the workspace root
    pub fn resolved_index_path(&self) -> PathBuf {
        match (&self.workspace_root, self.index_path.is_relative()) {
            (Some(root), true) => root.join(&self.index_path),
            _ => self.index_path.clone(),
        }
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = r#"# codevec configuration file

# Version of the configuration schema
version = 1

# Directory holding one subdirectory per collection (relative to workspace root)
index_path = ".codevec/index"

# Global debug mode
debug = false

[storage]
# Number of 2-character directory levels derived from the quantized vector
depth_factor = 4

# Output dimension of the random projection used for sharding
reduced_dim = 64

# "range" (analytic bounds stored per collection) or "quartile" (per vector)
quantization = "range"

# Maintain the legacy Hamming-distance candidate index
legacy_index = false

[hnsw]
# Graph connectivity
m = 16

# Construction quality
ef_construction = 200

# Default query-time accuracy knob (higher = better recall, slower)
ef_search = 50

# "cosine", "l2" or "ip"
space = "cosine"

# Share of changed points above which end_indexing rebuilds from scratch
incremental_max_ratio = 0.5

[git]
# Store blob hashes instead of text for clean tracked files
enabled = true

# Timeout for a single git invocation in seconds
timeout_secs = 5

# Maximum number of paths per git invocation
batch_size = 100

[search]
default_limit = 10
# score_threshold = 0.5
prefetch_limit = 0

[logging]
# Overridden by RUST_LOG when set
level = "warn"
"#;

        std::fs::write(&config_path, template)?;

        if force {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
        }

        Ok(config_path)
    }
}
