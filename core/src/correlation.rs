//! Pearson correlation: full matrices, rolling windows and weak-link
//! screening against a base asset.

use crate::{
    error::{AnalysisError, AnalysisResult},
    frame::PriceFrame,
    types::{AssetId, Date},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WEAK_THRESHOLD: f64 = 0.2;

/// Sample Pearson correlation. NaN for fewer than two points or a
/// zero-variance input.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x[..n].iter().zip(&y[..n]) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == a)?;
        let j = self.labels.iter().position(|l| l == b)?;
        Some(self.values[i][j])
    }

    pub fn size(&self) -> usize { self.labels.len() }

    /// Largest absolute off-diagonal coefficient, with its pair.
    pub fn strongest_pair(&self) -> Option<(String, String, f64)> {
        let mut best: Option<(String, String, f64)> = None;
        for i in 0..self.size() {
            for j in (i + 1)..self.size() {
                let v = self.values[i][j];
                if v.is_nan() {
                    continue;
                }
                if best.as_ref().map_or(true, |(_, _, b)| v.abs() > b.abs()) {
                    best = Some((self.labels[i].clone(), self.labels[j].clone(), v));
                }
            }
        }
        best
    }
}

/// Correlation between every pair of frame columns.
pub fn correlation_matrix(frame: &PriceFrame) -> CorrelationMatrix {
    let columns: Vec<Vec<f64>> = (0..frame.width()).map(|c| frame.column_at(c)).collect();
    corrcoef(frame.columns().to_vec(), &columns)
}

/// `np.corrcoef` over column vectors.
pub fn corrcoef(labels: Vec<String>, columns: &[Vec<f64>]) -> CorrelationMatrix {
    let k = columns.len();
    let mut values = vec![vec![f64::NAN; k]; k];
    for i in 0..k {
        for j in i..k {
            let r = pearson(&columns[i], &columns[j]);
            values[i][j] = r;
            values[j][i] = r;
        }
    }
    CorrelationMatrix { labels, values }
}

/// Rolling correlation of two columns. The first `window - 1` entries are NaN.
pub fn rolling_correlation(
    frame: &PriceFrame,
    base: &str,
    other: &str,
    window: usize,
) -> AnalysisResult<Vec<(Date, f64)>> {
    if window < 2 {
        return Err(AnalysisError::InsufficientData(format!(
            "rolling window must be at least 2, got {window}"
        )));
    }
    let x = frame
        .column(base)
        .ok_or_else(|| AnalysisError::UnknownColumn { name: base.to_string() })?;
    let y = frame
        .column(other)
        .ok_or_else(|| AnalysisError::UnknownColumn { name: other.to_string() })?;

    Ok(frame
        .index()
        .iter()
        .enumerate()
        .map(|(t, date)| {
            let r = if t + 1 < window {
                f64::NAN
            } else {
                let lo = t + 1 - window;
                window_corr(&x[lo..=t], &y[lo..=t])
            };
            (*date, r)
        })
        .collect())
}

// Pandas yields NaN for any window holding a NaN.
fn window_corr(x: &[f64], y: &[f64]) -> f64 {
    if x.iter().chain(y).any(|v| v.is_nan()) {
        return f64::NAN;
    }
    pearson(x, y)
}

/// Rolling correlation of `base` against each of `compare`, one column per
/// `<base>_vs_<asset>`. Returns `None` when no compare asset is present.
pub fn rolling_correlation_multi(
    frame: &PriceFrame,
    base: &str,
    compare: &[AssetId],
    window: usize,
) -> AnalysisResult<Option<PriceFrame>> {
    if !frame.has_column(base) {
        return Err(AnalysisError::UnknownColumn { name: base.to_string() });
    }
    let mut valid = Vec::new();
    for asset in compare {
        if frame.has_column(asset) {
            valid.push(asset.as_str());
        } else {
            log::warn!("Asset {asset} not found in data; skipping");
        }
    }
    if valid.is_empty() {
        log::warn!("No valid assets to compare");
        return Ok(None);
    }

    let mut columns = Vec::with_capacity(valid.len());
    let mut series = Vec::with_capacity(valid.len());
    for asset in valid {
        columns.push(format!("{base}_vs_{asset}"));
        series.push(rolling_correlation(frame, base, asset, window)?);
    }
    let rows = (0..frame.len())
        .map(|t| series.iter().map(|s| s[t].1).collect())
        .collect();
    Ok(Some(PriceFrame::new(frame.index().to_vec(), columns, rows)?))
}

/// Assets whose absolute correlation with `base` is below `threshold`.
pub fn weakly_correlated(
    matrix: &CorrelationMatrix,
    base: &str,
    threshold: f64,
) -> AnalysisResult<Vec<(AssetId, f64)>> {
    let i = matrix
        .labels
        .iter()
        .position(|l| l == base)
        .ok_or_else(|| AnalysisError::UnknownColumn { name: base.to_string() })?;
    let weak: Vec<(AssetId, f64)> = matrix
        .labels
        .iter()
        .zip(&matrix.values[i])
        .filter(|(label, v)| label.as_str() != base && v.abs() < threshold)
        .map(|(label, v)| (label.clone(), *v))
        .collect();
    if weak.is_empty() {
        log::info!("No assets with |correlation| < {threshold} against {base}");
    } else {
        log::info!("Assets weakly correlated with {base}:");
        for (asset, v) in &weak {
            log::info!("  {asset}: {v:.4}");
        }
    }
    Ok(weak)
}
