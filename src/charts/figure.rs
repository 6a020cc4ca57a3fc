//! Renderer-independent chart descriptions.
//!
//! A [`Figure`] is what both outputs are built from: the SVG renderer draws
//! it and `charts_data.json` / `GET /api/charts` serialize it as-is.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    /// Stable file stem, e.g. `cumulative_returns`.
    pub name: String,
    pub title: String,
    pub x_axis: String,
    pub y_axis: YAxis,
    pub plot: Plot,
    /// Named summary values shown alongside the plot (mean, median, ...).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub stats: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YAxis {
    pub title: String,
    pub begin_at_zero: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Plot {
    Line {
        labels: Vec<String>,
        datasets: Vec<Dataset>,
    },
    Bar {
        labels: Vec<String>,
        datasets: Vec<Dataset>,
    },
    /// Square matrix; `values[row][col]` pairs `labels[row]` with `labels[col]`.
    Heatmap {
        labels: Vec<String>,
        values: Vec<Vec<f64>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub label: String,
    pub data: Vec<f64>,
    pub color: Rgba,
    pub fill: bool,
}

/// Colour with alpha in `0.0..=1.0`. Serializes as a CSS `rgba(...)` string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn with_alpha(self, a: f64) -> Self {
        Self { a, ..self }
    }

    pub fn css(&self) -> String {
        format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

impl Serialize for Rgba {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.css())
    }
}

impl Figure {
    /// Category labels along the x axis.
    pub fn labels(&self) -> &[String] {
        match &self.plot {
            Plot::Line { labels, .. } | Plot::Bar { labels, .. } | Plot::Heatmap { labels, .. } => {
                labels
            }
        }
    }

    /// Smallest and largest finite dataset value, if any.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let values: Box<dyn Iterator<Item = f64> + '_> = match &self.plot {
            Plot::Line { datasets, .. } | Plot::Bar { datasets, .. } => {
                Box::new(datasets.iter().flat_map(|d| d.data.iter().copied()))
            }
            Plot::Heatmap { values, .. } => Box::new(values.iter().flatten().copied()),
        };
        values
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
