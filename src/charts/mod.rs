//! Chart data preparation and rendering.
//!
//! Reads the CSV files written by the data refresh script, builds one
//! [`Figure`] per dashboard chart and renders each to SVG. A bad or missing
//! file only affects the charts that depend on it.

pub mod builders;
pub mod figure;
pub mod histogram;
pub mod render;
pub mod series;
pub mod table;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ChartsConfig;

pub use self::builders::{build_all, Sources, FIGURE_NAMES};
pub use self::figure::{Dataset, Figure, Plot, Rgba, YAxis};
pub use self::render::{RenderOptions, Renderer};
pub use self::table::{Row, Table};

/// File holding every figure description next to the rendered charts.
pub const DATA_FILE: &str = "charts_data.json";

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render {chart}: {message}")]
    Render { chart: String, message: String },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode chart data: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of one chart in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChartStatus {
    Rendered { path: PathBuf },
    NoData,
    Failed { error: String },
}

impl ChartStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ChartStatus::Rendered { .. } => "rendered",
            ChartStatus::NoData => "no_data",
            ChartStatus::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartResult {
    pub name: String,
    #[serde(flatten)]
    pub status: ChartStatus,
}

/// Outcome of [`generate_all`].
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub output_dir: PathBuf,
    pub charts: Vec<ChartResult>,
    /// Path of `charts_data.json`, unless writing it failed.
    pub data_file: Option<PathBuf>,
}

impl GenerationReport {
    pub fn count(&self, label: &str) -> usize {
        self.charts
            .iter()
            .filter(|c| c.status.label() == label)
            .count()
    }
}

/// Per-file load result. A failed load fails only the charts that need it.
struct Loaded {
    metrics: Result<Table, String>,
    prices: Result<Table, String>,
    weights: Result<Table, String>,
}

fn load(path: &Path, delimiter: u8) -> Result<Table, String> {
    Table::read_or_empty(path, delimiter).map_err(|e| {
        warn!(path = %path.display(), error = %e, "data file unreadable");
        e.to_string()
    })
}

fn load_sources(config: &ChartsConfig) -> Loaded {
    let delimiter = config.delimiter_byte();
    Loaded {
        metrics: load(&config.metrics_path(), delimiter),
        prices: load(&config.prices_path(), delimiter),
        weights: load(&config.weights_path(), delimiter),
    }
}

fn source_error(loaded: &Loaded, name: &str) -> Option<String> {
    let source = match name {
        "correlation_matrix" => &loaded.prices,
        "strategy_weights" => &loaded.weights,
        _ => &loaded.metrics,
    };
    source.as_ref().err().cloned()
}

fn tables(loaded: &Loaded) -> Sources {
    let ok = |t: &Result<Table, String>| t.as_ref().cloned().unwrap_or_default();
    Sources {
        metrics: ok(&loaded.metrics),
        prices: ok(&loaded.prices),
        weights: ok(&loaded.weights),
    }
}

/// Build every figure from the files currently on disk.
///
/// Unreadable or empty sources give `None` for the affected figures.
pub fn build_figures(config: &ChartsConfig) -> BTreeMap<String, Option<Figure>> {
    let loaded = load_sources(config);
    build_all(&tables(&loaded), config.histogram_bins)
        .into_iter()
        .map(|(name, figure)| (name.to_string(), figure))
        .collect()
}

/// Render every chart into `config.output_dir` and write `charts_data.json`.
///
/// Only failing to create the output directory is an error; every other
/// problem is recorded on the affected chart and the batch carries on.
pub fn generate_all(config: &ChartsConfig) -> Result<GenerationReport, ChartError> {
    let output_dir = config.output_dir.clone();
    std::fs::create_dir_all(&output_dir).map_err(|source| ChartError::OutputDir {
        path: output_dir.clone(),
        source,
    })?;

    let loaded = load_sources(config);
    let renderer = Renderer::new(RenderOptions::from(config));
    let mut charts = Vec::with_capacity(FIGURE_NAMES.len());
    let mut data = BTreeMap::new();

    for (name, figure) in build_all(&tables(&loaded), config.histogram_bins) {
        let status = match (source_error(&loaded, name), &figure) {
            (Some(error), _) => ChartStatus::Failed { error },
            (None, None) => {
                info!(chart = name, "no data available");
                ChartStatus::NoData
            }
            (None, Some(fig)) => match renderer.render_to(fig, &output_dir) {
                Ok(path) => {
                    info!(chart = name, path = %path.display(), "chart rendered");
                    ChartStatus::Rendered { path }
                }
                Err(e) => {
                    warn!(chart = name, error = %e, "chart rendering failed");
                    ChartStatus::Failed {
                        error: e.to_string(),
                    }
                }
            },
        };
        charts.push(ChartResult {
            name: name.to_string(),
            status,
        });
        data.insert(name.to_string(), figure);
    }

    let data_file = match write_data_file(&output_dir, &data) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(error = %e, "chart data file not written");
            None
        }
    };

    let report = GenerationReport {
        output_dir,
        charts,
        data_file,
    };
    info!(
        rendered = report.count("rendered"),
        no_data = report.count("no_data"),
        failed = report.count("failed"),
        "chart generation finished"
    );
    Ok(report)
}

fn write_data_file(
    dir: &Path,
    data: &BTreeMap<String, Option<Figure>>,
) -> Result<PathBuf, ChartError> {
    let json = serde_json::to_string_pretty(data)?;
    let path = dir.join(DATA_FILE);
    std::fs::write(&path, json).map_err(|source| ChartError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
