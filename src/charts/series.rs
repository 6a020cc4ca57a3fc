//! Derived series: returns, drawdowns, correlations and summary statistics.

/// Simple period-over-period returns, as fractions. A zero previous price
/// gives a zero return. The output is one shorter than the input.
pub fn daily_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|w| if w[0] == 0.0 { 0.0 } else { w[1] / w[0] - 1.0 })
        .collect()
}

/// Running-peak drawdown of a wealth series, in percent (`0` at a new peak).
pub fn drawdown(wealth: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    wealth
        .iter()
        .map(|&w| {
            if w > peak {
                peak = w;
            }
            if peak > 0.0 {
                (w - peak) / peak * 100.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Drawdown of a cumulative return series given in percent.
pub fn drawdown_from_cumulative(cumulative_pct: &[f64]) -> Vec<f64> {
    let wealth: Vec<f64> = cumulative_pct.iter().map(|r| 1.0 + r / 100.0).collect();
    drawdown(&wealth)
}

/// Pearson correlation over the common prefix of `a` and `b`.
///
/// Returns `0.0` when fewer than two points overlap or either side has zero
/// variance.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let mean_a = mean(a).unwrap_or(0.0);
    let mean_b = mean(b).unwrap_or(0.0);

    let mut num = 0.0;
    let mut ss_a = 0.0;
    let mut ss_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        num += dx * dy;
        ss_a += dx * dx;
        ss_b += dy * dy;
    }
    let denom = (ss_a * ss_b).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        0.0
    } else {
        num / denom
    }
}

/// Symmetric correlation matrix, unit diagonal, entries rounded to 3 places.
pub fn correlation_matrix(series: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = series.len();
    let mut out = vec![vec![0.0; n]; n];
    for i in 0..n {
        out[i][i] = 1.0;
        for j in (i + 1)..n {
            let r = round3(pearson(&series[i], &series[j]));
            out[i][j] = r;
            out[j][i] = r;
        }
    }
    out
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Median of the finite values.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
