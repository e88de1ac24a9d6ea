//! Bootstrap configuration and root folder resolution
//!
//! Configuration sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. TOML config file
//! 4. Compiled defaults
//!
//! A missing or unreadable TOML file never stops a service from starting.
//! It is logged and the compiled defaults are used instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "NEXFLUC_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder for the database and other service data
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Provider credentials (environment variables take priority)
    #[serde(default)]
    pub providers: ProviderKeys,

    /// Pipeline tuning parameters
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Provider API keys as written in the TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderKeys {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub tavily_api_key: Option<String>,
}

/// Tuning parameters for the derivation pipeline
///
/// Every field has a compiled default; a partial `[pipeline]` table only
/// overrides the keys it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Debounce for the graph stream (live transcript deltas)
    pub graph_debounce_ms: u64,
    /// Debounce for the insight stream (discrete message deltas)
    pub insight_debounce_ms: u64,
    /// Minimum stream text length before a derivation is scheduled
    pub min_trigger_chars: usize,
    /// Per-call provider timeout
    pub provider_timeout_ms: u64,
    /// Maximum in-flight enrichment lookups per derivation
    pub enrichment_concurrency: usize,
    /// Search requests per second, per search provider
    pub search_requests_per_second: u32,
    /// Edge weight for matching entity kinds
    pub kind_match_weight: f32,
    /// Edge weight for overlapping label tokens
    pub label_overlap_weight: f32,
    /// Edge weight for label containment in a description
    pub description_containment_weight: f32,
    /// Edges are materialized only above this score
    pub edge_threshold: f32,
    /// Layout viewport width
    pub layout_width: f32,
    /// Layout viewport height
    pub layout_height: f32,
    /// Upper bound on layout iterations
    pub layout_max_iterations: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            graph_debounce_ms: 1000,
            insight_debounce_ms: 2000,
            min_trigger_chars: 20,
            provider_timeout_ms: 15_000,
            enrichment_concurrency: 4,
            search_requests_per_second: 5,
            kind_match_weight: 0.2,
            label_overlap_weight: 0.3,
            description_containment_weight: 0.2,
            edge_threshold: 0.4,
            layout_width: 400.0,
            layout_height: 400.0,
            layout_max_iterations: 300,
        }
    }
}

/// Default TOML config location: `<config dir>/nexfluc/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nexfluc").join(format!("{}.toml", module_name)))
}

/// Load TOML config from a path
///
/// A missing file yields the defaults with a warning. A file that exists
/// but does not parse is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using compiled defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Resolve the root folder
///
/// Priority: CLI argument → `NEXFLUC_ROOT_FOLDER` → TOML `root_folder` → OS default.
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("nexfluc"))
        .unwrap_or_else(|| PathBuf::from("./nexfluc_data"))
}
