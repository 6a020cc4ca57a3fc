//! TOML configuration for the portfolio dashboard.
//!
//! Every section is optional and falls back to compiled-in defaults. The file
//! is located through `--config`, the `PORTFOLIO_DASH_CONFIG` environment
//! variable, or `./portfolio-dash.toml`, in that order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "PORTFOLIO_DASH_CONFIG";

/// Config file picked up from the working directory when nothing else is set.
pub const LOCAL_CONFIG_FILE: &str = "portfolio-dash.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the dashboard process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub charts: ChartsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DashboardConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded dashboard configuration");
        Ok(config)
    }

    /// Resolve the configuration for this process.
    ///
    /// An explicit path (from the CLI) must load; a broken file named by the
    /// environment variable or found in the working directory only produces a
    /// warning and the search continues.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "PORTFOLIO_DASH_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize configuration")
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the HTTP listener.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

/// External data-generation script configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Interpreter used to run the script.
    pub interpreter: String,
    /// Script path. Relative paths resolve against `working_dir`.
    pub script: PathBuf,
    /// Working directory for the script. Unset means the process working
    /// directory at the time of the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Hard wall-clock limit for one run.
    pub timeout_secs: u64,
    /// What to do with a refresh request while another run is in flight.
    pub concurrency: ConcurrencyPolicy,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            script: PathBuf::from("scripts/update_data.py"),
            working_dir: None,
            timeout_secs: 300,
            concurrency: ConcurrencyPolicy::Join,
        }
    }
}

impl RefreshConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Handling of overlapping refresh requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// Attach to the in-flight run and share its result.
    #[default]
    Join,
    /// Refuse the request while a run is in flight.
    Reject,
}

// ---------------------------------------------------------------------------
// Charts
// ---------------------------------------------------------------------------

/// Chart data sources and rendering options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartsConfig {
    /// Directory holding the CSV files written by the external script.
    pub data_dir: PathBuf,
    /// Directory that rendered charts are written to and served from.
    pub output_dir: PathBuf,
    /// Portfolio time series (date, cumulative return, drawdown, daily return).
    pub metrics_file: String,
    /// Asset price table, first column is the date.
    pub prices_file: String,
    /// Strategy weight table, first column is the asset.
    pub weights_file: String,
    /// Field delimiter for every data file.
    pub delimiter: char,
    /// Number of bins in the return distribution.
    pub histogram_bins: usize,
    /// Rendered chart width in pixels.
    pub width: u32,
    /// Rendered chart height in pixels.
    pub height: u32,
}

impl Default for ChartsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("public/reports"),
            metrics_file: "portfolio_metrics.csv".to_string(),
            prices_file: "crypto_prices.csv".to_string(),
            weights_file: "portfolio_weights_comparison.csv".to_string(),
            delimiter: ',',
            histogram_bins: 20,
            width: 800,
            height: 600,
        }
    }
}

impl ChartsConfig {
    pub fn metrics_path(&self) -> PathBuf {
        self.data_dir.join(&self.metrics_file)
    }

    pub fn prices_path(&self) -> PathBuf {
        self.data_dir.join(&self.prices_file)
    }

    pub fn weights_path(&self) -> PathBuf {
        self.data_dir.join(&self.weights_file)
    }

    /// Delimiter as a single byte. Non-ASCII delimiters fall back to a comma.
    pub fn delimiter_byte(&self) -> u8 {
        if self.delimiter.is_ascii() {
            self.delimiter as u8
        } else {
            warn!(delimiter = %self.delimiter, "non-ASCII delimiter, using ','");
            b','
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
