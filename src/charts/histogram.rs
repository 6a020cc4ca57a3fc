//! Equal-width histogram binning.

use serde::Serialize;

/// One histogram bin. Covers `[start, end)`, except the last bin which also
/// includes `end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

impl Bin {
    /// Axis label, e.g. `"-1.25%"`.
    pub fn label(&self) -> String {
        format!("{:.2}%", self.start)
    }
}

/// Split the finite values of `values` into `bins` equal-width bins between
/// their minimum and maximum.
///
/// The maximum always lands in the last bin. When every value is equal the
/// bins have zero width and everything is counted in the last one. Empty input
/// or `bins == 0` gives no bins.
pub fn histogram(values: &[f64], bins: usize) -> Vec<Bin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }

    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (max - min) / bins as f64;

    let mut out: Vec<Bin> = (0..bins)
        .map(|i| Bin {
            start: min + i as f64 * width,
            end: if i + 1 == bins {
                max
            } else {
                min + (i + 1) as f64 * width
            },
            count: 0,
        })
        .collect();

    for v in finite {
        let idx = out.partition_point(|b| b.end <= v).min(bins - 1);
        out[idx].count += 1;
    }
    out
}
