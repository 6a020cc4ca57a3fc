//! Figure builders, one per dashboard chart.
//!
//! Each builder returns `None` when its source table has nothing to plot.

use std::collections::BTreeMap;

use super::figure::{Dataset, Figure, Plot, Rgba, YAxis};
use super::histogram::histogram;
use super::series::{
    correlation_matrix as correlate, daily_returns, drawdown_from_cumulative, mean, median,
};
use super::table::Table;

const DATE_COLUMNS: &[&str] = &["date", "Date"];
const CUMULATIVE_COLUMNS: &[&str] = &["cumulative_return", "portfolio_return"];
const DRAWDOWN_COLUMN: &str = "drawdown";
const DAILY_RETURN_COLUMN: &str = "daily_return";

const TEAL: Rgba = Rgba::rgb(75, 192, 192);
const RED: Rgba = Rgba::rgb(255, 99, 132);
const BLUE: Rgba = Rgba::rgb(54, 162, 235);
const YELLOW: Rgba = Rgba::rgb(255, 205, 86);
const STRATEGY_COLORS: [Rgba; 4] = [RED, BLUE, YELLOW, TEAL];

/// Names of every figure, in dashboard order.
pub const FIGURE_NAMES: [&str; 5] = [
    "cumulative_returns",
    "portfolio_drawdown",
    "return_distribution",
    "correlation_matrix",
    "strategy_weights",
];

fn date_labels(table: &Table) -> Vec<String> {
    table
        .rows
        .iter()
        .map(|r| r.first_text(DATE_COLUMNS).to_string())
        .collect()
}

fn has_any(table: &Table, columns: &[&str]) -> bool {
    columns.iter().any(|c| table.has_column(c))
}

fn cumulative(table: &Table) -> Vec<f64> {
    table
        .rows
        .iter()
        .map(|r| r.first_number(CUMULATIVE_COLUMNS))
        .collect()
}

pub fn cumulative_returns(metrics: &Table) -> Option<Figure> {
    if metrics.is_empty() || !has_any(metrics, CUMULATIVE_COLUMNS) {
        return None;
    }
    Some(Figure {
        name: "cumulative_returns".to_string(),
        title: "Portfolio Cumulative Returns".to_string(),
        x_axis: "Date".to_string(),
        y_axis: YAxis {
            title: "Cumulative Return (%)".to_string(),
            begin_at_zero: false,
            max: None,
        },
        plot: Plot::Line {
            labels: date_labels(metrics),
            datasets: vec![Dataset {
                label: "Portfolio Cumulative Returns".to_string(),
                data: cumulative(metrics),
                color: TEAL,
                fill: false,
            }],
        },
        stats: BTreeMap::new(),
    })
}

/// Uses the `drawdown` column when present, otherwise derives drawdown from
/// the cumulative return column.
pub fn portfolio_drawdown(metrics: &Table) -> Option<Figure> {
    if metrics.is_empty() {
        return None;
    }
    let data = if metrics.has_column(DRAWDOWN_COLUMN) {
        metrics.column(DRAWDOWN_COLUMN)
    } else if has_any(metrics, CUMULATIVE_COLUMNS) {
        drawdown_from_cumulative(&cumulative(metrics))
    } else {
        return None;
    };
    Some(Figure {
        name: "portfolio_drawdown".to_string(),
        title: "Portfolio Drawdown".to_string(),
        x_axis: "Date".to_string(),
        y_axis: YAxis {
            title: "Drawdown (%)".to_string(),
            begin_at_zero: false,
            max: None,
        },
        plot: Plot::Line {
            labels: date_labels(metrics),
            datasets: vec![Dataset {
                label: "Portfolio Drawdown".to_string(),
                data,
                color: RED,
                fill: true,
            }],
        },
        stats: BTreeMap::new(),
    })
}

pub fn return_distribution(metrics: &Table, bins: usize) -> Option<Figure> {
    if !metrics.has_column(DAILY_RETURN_COLUMN) {
        return None;
    }
    let returns: Vec<f64> = metrics
        .column(DAILY_RETURN_COLUMN)
        .into_iter()
        .filter(|v| v.is_finite())
        .collect();
    let bins = histogram(&returns, bins);
    if bins.is_empty() {
        return None;
    }

    let mut stats = BTreeMap::new();
    if let Some(m) = mean(&returns) {
        stats.insert("mean".to_string(), m);
    }
    if let Some(m) = median(&returns) {
        stats.insert("median".to_string(), m);
    }

    Some(Figure {
        name: "return_distribution".to_string(),
        title: "Daily Returns Distribution".to_string(),
        x_axis: "Daily Return (%)".to_string(),
        y_axis: YAxis {
            title: "Frequency".to_string(),
            begin_at_zero: true,
            max: None,
        },
        plot: Plot::Bar {
            labels: bins.iter().map(|b| b.label()).collect(),
            datasets: vec![Dataset {
                label: "Frequency".to_string(),
                data: bins.iter().map(|b| b.count as f64).collect(),
                color: BLUE.with_alpha(0.6),
                fill: true,
            }],
        },
        stats,
    })
}

/// Correlation of daily returns between the asset columns of a price table.
/// The first column is the date.
pub fn correlation_matrix(prices: &Table) -> Option<Figure> {
    let assets: Vec<String> = prices.headers.iter().skip(1).cloned().collect();
    if assets.is_empty() || prices.rows.len() < 2 {
        return None;
    }
    let returns: Vec<Vec<f64>> = assets
        .iter()
        .map(|asset| daily_returns(&prices.column(asset)))
        .collect();

    Some(Figure {
        name: "correlation_matrix".to_string(),
        title: "Asset Correlation Matrix".to_string(),
        x_axis: "Assets".to_string(),
        y_axis: YAxis {
            title: "Assets".to_string(),
            begin_at_zero: false,
            max: None,
        },
        plot: Plot::Heatmap {
            labels: assets,
            values: correlate(&returns),
        },
        stats: BTreeMap::new(),
    })
}

/// Grouped bars: assets from the first column, one dataset per strategy column.
pub fn strategy_weights(weights: &Table) -> Option<Figure> {
    if weights.is_empty() || weights.headers.len() < 2 {
        return None;
    }
    let asset_column = &weights.headers[0];
    let labels: Vec<String> = weights
        .rows
        .iter()
        .map(|r| r.get(asset_column).to_string())
        .collect();
    let datasets = weights.headers[1..]
        .iter()
        .enumerate()
        .map(|(i, strategy)| Dataset {
            label: strategy.clone(),
            data: weights.column(strategy),
            color: STRATEGY_COLORS[i % STRATEGY_COLORS.len()].with_alpha(0.6),
            fill: true,
        })
        .collect();

    Some(Figure {
        name: "strategy_weights".to_string(),
        title: "Portfolio Strategy Weights Comparison".to_string(),
        x_axis: "Assets".to_string(),
        y_axis: YAxis {
            title: "Weight".to_string(),
            begin_at_zero: true,
            max: Some(1.0),
        },
        plot: Plot::Bar { labels, datasets },
        stats: BTreeMap::new(),
    })
}

/// Source tables for one build pass.
#[derive(Debug, Default)]
pub struct Sources {
    pub metrics: Table,
    pub prices: Table,
    pub weights: Table,
}

/// Build every figure by name. `None` means no data.
pub fn build_all(sources: &Sources, bins: usize) -> Vec<(&'static str, Option<Figure>)> {
    vec![
        (FIGURE_NAMES[0], cumulative_returns(&sources.metrics)),
        (FIGURE_NAMES[1], portfolio_drawdown(&sources.metrics)),
        (FIGURE_NAMES[2], return_distribution(&sources.metrics, bins)),
        (FIGURE_NAMES[3], correlation_matrix(&sources.prices)),
        (FIGURE_NAMES[4], strategy_weights(&sources.weights)),
    ]
}
