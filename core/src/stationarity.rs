//! Augmented Dickey-Fuller unit-root test (regression with constant).
//!
//! H0: the series has a unit root. A p-value below the significance level
//! means the series can be treated as stationary.
//!
//! Lag length is chosen by minimum AIC over 0..=max_lag, all candidates
//! fitted on the same sample. The chosen lag is then refitted on its full
//! sample and the t-statistic of the lagged level is reported.

use crate::{
    error::{AnalysisError, AnalysisResult},
    ols::ols,
};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

// MacKinnon (1994) approximate p-value surface, one variable, constant only.
const TAU_MAX_C: f64 = 2.74;
const TAU_MIN_C: f64 = -18.83;
const TAU_STAR_C: f64 = -1.61;
const TAU_C_SMALLP: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_C_LARGEP: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

// MacKinnon (2010) response surface for critical values, constant only.
const TAU_C_CRIT: [(&str, [f64; 4]); 3] = [
    ("1%",  [-3.43035, -6.5393, -16.786, -79.433]),
    ("5%",  [-2.86154, -2.8903, -4.234, -40.040]),
    ("10%", [-2.56677, -1.5384, -2.809, 0.0]),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdfResult {
    pub statistic:       f64,
    pub p_value:         f64,
    pub used_lag:        usize,
    pub nobs:            usize,
    pub critical_values: Vec<(String, f64)>,
    /// Best information criterion value from the lag search.
    pub ic_best:         f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationarityReport {
    pub series:     String,
    pub adf:        AdfResult,
    pub stationary: bool,
}

/// Run the ADF test. `max_lag = None` uses ceil(12 * (n/100)^(1/4)).
pub fn adf_test(series: &[f64], max_lag: Option<usize>) -> AnalysisResult<AdfResult> {
    let n = series.len();
    if series.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::InsufficientData("ADF input contains non-finite values".into()));
    }
    // One lagged level plus the constant must fit next to the lag terms.
    let cap = (n / 2).checked_sub(2).ok_or_else(|| {
        AnalysisError::InsufficientData(format!("ADF needs at least 4 observations, got {n}"))
    })?;
    let default_lag = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    let max_lag = max_lag.unwrap_or(default_lag).min(cap);

    let diff: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

    // Lag search on the common sample starting at max_lag.
    let y_common = response(&diff, max_lag);
    let mut best: Option<(usize, f64)> = None;
    for lag in 0..=max_lag {
        let x = design(series, &diff, max_lag, lag);
        let aic = ols(&x, &y_common, "adf lag search")?.aic();
        if best.map_or(true, |(_, b)| aic < b) {
            best = Some((lag, aic));
        }
    }
    let (used_lag, ic_best) = best.unwrap_or((0, f64::NAN));

    let y = response(&diff, used_lag);
    let x = design(series, &diff, used_lag, used_lag);
    let fit = ols(&x, &y, "adf regression")?;
    let statistic = fit.t_value(1);
    let nobs = y.len();

    Ok(AdfResult {
        statistic,
        p_value: mackinnon_p(statistic)?,
        used_lag,
        nobs,
        critical_values: mackinnon_crit(nobs),
        ic_best,
    })
}

/// ADF with the conventional 5% cut-off, logged the way analysts read it.
pub fn check_stationarity(series: &[f64], name: &str, alpha: f64) -> AnalysisResult<StationarityReport> {
    let adf = adf_test(series, None)?;
    log::info!("{name} ADF Statistic: {:.6}", adf.statistic);
    log::info!("{name} p-value: {:.6}", adf.p_value);
    let stationary = adf.p_value < alpha;
    if stationary {
        log::info!("{name} is stationary.");
    } else {
        log::info!("{name} is not stationary. Consider differencing.");
    }
    Ok(StationarityReport { series: name.to_string(), adf, stationary })
}

/// Approximate asymptotic p-value for the ADF t-statistic.
pub fn mackinnon_p(stat: f64) -> AnalysisResult<f64> {
    if stat > TAU_MAX_C {
        return Ok(1.0);
    }
    if stat < TAU_MIN_C {
        return Ok(0.0);
    }
    let poly = if stat <= TAU_STAR_C {
        polyval(&TAU_C_SMALLP, stat)
    } else {
        polyval(&TAU_C_LARGEP, stat)
    };
    let normal = Normal::new(0.0, 1.0).map_err(|e| AnalysisError::Distribution(e.to_string()))?;
    Ok(normal.cdf(poly))
}

/// Finite-sample critical values at 1%, 5% and 10%.
pub fn mackinnon_crit(nobs: usize) -> Vec<(String, f64)> {
    let t = nobs as f64;
    TAU_C_CRIT
        .iter()
        .map(|(label, b)| {
            (label.to_string(), b[0] + b[1] / t + b[2] / (t * t) + b[3] / (t * t * t))
        })
        .collect()
}

/// Coefficients in ascending power order.
fn polyval(coefs: &[f64], x: f64) -> f64 {
    coefs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Δy_t for t = start..
fn response(diff: &[f64], start: usize) -> DVector<f64> {
    DVector::from_column_slice(&diff[start..])
}

/// Rows t = start.., columns [1, y_t, Δy_{t-1}, .., Δy_{t-lags}].
/// `y_t` is the level preceding the differenced value Δy_t = y_{t+1} - y_t.
fn design(series: &[f64], diff: &[f64], start: usize, lags: usize) -> DMatrix<f64> {
    let rows = diff.len() - start;
    DMatrix::from_fn(rows, 2 + lags, |r, c| {
        let t = start + r;
        match c {
            0 => 1.0,
            1 => series[t],
            j => diff[t - (j - 1)],
        }
    })
}
