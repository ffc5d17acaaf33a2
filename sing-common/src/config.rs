//! Configuration loading for the singing renderer
//!
//! Bootstrap configuration lives in a single TOML file. Resolution order:
//! 1. Command-line argument (highest priority)
//! 2. `SING_RENDER_CONFIG` environment variable
//! 3. `<config dir>/sing-render/config.toml`
//! 4. Built-in defaults (fallback)
//!
//! A missing file falls through to the next source; a file that exists but
//! does not parse is an error.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{EngineId, StyleId};
use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SING_RENDER_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Engine id → base URL of its HTTP API
    #[serde(default = "default_engines")]
    pub engines: BTreeMap<String, String>,

    /// Timeout for a single engine request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Pipeline tuning
    #[serde(default)]
    pub render: RenderSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            engines: default_engines(),
            request_timeout_ms: default_request_timeout_ms(),
            render: RenderSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Engine base URLs keyed by typed engine id
    pub fn engine_urls(&self) -> BTreeMap<EngineId, String> {
        self.engines
            .iter()
            .map(|(id, url)| (EngineId::new(id.clone()), url.clone()))
            .collect()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.render.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve and load configuration following the documented priority order
    pub fn resolve(cli_arg: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_arg {
            info!("Loading config from command line: {}", path.display());
            return Self::load_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                info!("Loading config from {}: {}", CONFIG_ENV_VAR, path.display());
                return Self::load_file(&path);
            }
            warn!(
                "{} points to missing file {}, ignoring",
                CONFIG_ENV_VAR,
                path.display()
            );
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                info!("Loading config from {}", path.display());
                return Self::load_file(&path);
            }
        }

        info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }
}

/// Platform config file location (`~/.config/sing-render/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sing-render").join("config.toml"))
}

/// Pipeline constants that shape engine requests and post-processing
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenderSettings {
    /// Length of the rest appended after the last note
    #[serde(default = "default_last_rest_duration_seconds")]
    pub last_rest_duration_seconds: f64,

    /// Fade applied to the volume at the start of the trailing rest
    #[serde(default = "default_fade_out_duration_seconds")]
    pub fade_out_duration_seconds: f64,

    /// Style used for query and volume generation
    #[serde(default = "default_singing_teacher_style_id")]
    pub singing_teacher_style_id: i64,

    /// Minimum length of the rest placed before a phrase's first note
    #[serde(default = "default_first_rest_min_duration_seconds")]
    pub first_rest_min_duration_seconds: f64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            last_rest_duration_seconds: default_last_rest_duration_seconds(),
            fade_out_duration_seconds: default_fade_out_duration_seconds(),
            singing_teacher_style_id: default_singing_teacher_style_id(),
            first_rest_min_duration_seconds: default_first_rest_min_duration_seconds(),
        }
    }
}

impl RenderSettings {
    pub fn singing_teacher_style_id(&self) -> StyleId {
        StyleId(self.singing_teacher_style_id)
    }

    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("last_rest_duration_seconds", self.last_rest_duration_seconds),
            ("fade_out_duration_seconds", self.fade_out_duration_seconds),
            (
                "first_rest_min_duration_seconds",
                self.first_rest_min_duration_seconds,
            ),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "render.{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error)
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

fn default_engines() -> BTreeMap<String, String> {
    let mut engines = BTreeMap::new();
    engines.insert(
        DEFAULT_ENGINE_ID.to_string(),
        "http://127.0.0.1:50021".to_string(),
    );
    engines
}

/// Engine id used when no engines are configured
pub const DEFAULT_ENGINE_ID: &str = "074fc39e-678b-4c13-8916-ffca8d505d1d";

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_last_rest_duration_seconds() -> f64 {
    0.5
}

fn default_fade_out_duration_seconds() -> f64 {
    0.15
}

fn default_singing_teacher_style_id() -> i64 {
    6000
}

fn default_first_rest_min_duration_seconds() -> f64 {
    0.12
}

fn default_log_level() -> String {
    "info".to_string()
}
