//! Pairwise Granger causality tests.
//!
//! For each lag L in 1..=maxlag, two regressions of the effect series on a
//! constant are compared on the same sample:
//!   restricted:   effect lags 1..L
//!   unrestricted: effect lags 1..L plus cause lags 1..L
//! and three statistics are reported: the SSR F-test, the SSR chi2-test and
//! the likelihood-ratio test.

use crate::{
    error::{AnalysisError, AnalysisResult},
    frame::PriceFrame,
    ols::{ols, OlsFit},
    types::AssetId,
};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor};

/// "Does `cause` Granger-cause `effect`?"
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrangerPair {
    pub effect: AssetId,
    pub cause:  AssetId,
}

impl GrangerPair {
    pub fn new(effect: &str, cause: &str) -> Self {
        Self { effect: effect.to_string(), cause: cause.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestStatistic {
    pub statistic: f64,
    pub p_value:   f64,
    pub df:        usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GrangerLagResult {
    pub lag:          usize,
    pub ssr_ftest:    TestStatistic,
    /// Denominator degrees of freedom of the F-test.
    pub ssr_ftest_df_den: usize,
    pub ssr_chi2test: TestStatistic,
    pub lrtest:       TestStatistic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GrangerReport {
    pub pair: GrangerPair,
    pub lags: Vec<GrangerLagResult>,
}

impl GrangerReport {
    /// Smallest F-test p-value across all tested lags.
    pub fn min_f_p_value(&self) -> f64 {
        self.lags
            .iter()
            .map(|l| l.ssr_ftest.p_value)
            .fold(f64::INFINITY, f64::min)
    }
}

/// Run the tests for lags 1..=maxlag.
pub fn granger_causality_tests(
    frame: &PriceFrame,
    pair: &GrangerPair,
    maxlag: usize,
) -> AnalysisResult<GrangerReport> {
    if maxlag == 0 {
        return Err(AnalysisError::InsufficientData("maxlag must be a positive integer".into()));
    }
    let effect = frame
        .column(&pair.effect)
        .ok_or_else(|| AnalysisError::UnknownColumn { name: pair.effect.clone() })?;
    let cause = frame
        .column(&pair.cause)
        .ok_or_else(|| AnalysisError::UnknownColumn { name: pair.cause.clone() })?;
    if effect.iter().chain(&cause).any(|v| !v.is_finite()) {
        return Err(AnalysisError::InsufficientData(
            "Granger input contains missing or non-finite values".into(),
        ));
    }
    let n = effect.len();
    if n <= 3 * maxlag + 1 {
        return Err(AnalysisError::InsufficientData(format!(
            "Insufficient observations. Maximum allowable lag is {}",
            (n.saturating_sub(1) / 3).saturating_sub(1)
        )));
    }

    let mut lags = Vec::with_capacity(maxlag);
    for lag in 1..=maxlag {
        lags.push(test_lag(&effect, &cause, lag)?);
    }
    Ok(GrangerReport { pair: pair.clone(), lags })
}

/// Run the test for every pair. A pair that fails is logged and skipped.
pub fn granger_causality(
    frame: &PriceFrame,
    pairs: &[GrangerPair],
    maxlag: usize,
) -> Vec<GrangerReport> {
    let mut reports = Vec::new();
    for pair in pairs {
        log::info!("Testing causality between {} and {}:", pair.effect, pair.cause);
        match granger_causality_tests(frame, pair, maxlag) {
            Ok(report) => {
                for l in &report.lags {
                    log::info!(
                        "  lag {}: ssr F={:.4} p={:.4} | chi2={:.4} p={:.4} | lr={:.4} p={:.4}",
                        l.lag,
                        l.ssr_ftest.statistic,
                        l.ssr_ftest.p_value,
                        l.ssr_chi2test.statistic,
                        l.ssr_chi2test.p_value,
                        l.lrtest.statistic,
                        l.lrtest.p_value,
                    );
                }
                reports.push(report);
            }
            Err(e) => log::error!(
                "Error testing Granger causality for ({}, {}): {e}",
                pair.effect,
                pair.cause
            ),
        }
    }
    reports
}

fn test_lag(effect: &[f64], cause: &[f64], lag: usize) -> AnalysisResult<GrangerLagResult> {
    let n = effect.len();
    let nobs = n - lag;
    let y = DVector::from_column_slice(&effect[lag..]);

    // Columns: effect lags 1..=lag, [cause lags 1..=lag], constant last.
    let own = DMatrix::from_fn(nobs, lag + 1, |r, c| {
        if c == lag { 1.0 } else { effect[lag + r - (c + 1)] }
    });
    let joint = DMatrix::from_fn(nobs, 2 * lag + 1, |r, c| {
        let t = lag + r;
        if c < lag {
            effect[t - (c + 1)]
        } else if c < 2 * lag {
            cause[t - (c - lag + 1)]
        } else {
            1.0
        }
    });

    let down = ols(&own, &y, "granger restricted")?;
    let full = ols(&joint, &y, "granger unrestricted")?;
    build_result(lag, &down, &full)
}

fn build_result(lag: usize, down: &OlsFit, full: &OlsFit) -> AnalysisResult<GrangerLagResult> {
    let dist_err = |e: statrs::StatsError| AnalysisError::Distribution(e.to_string());
    let df_den = full.df_resid();
    let gain = (down.ssr - full.ssr) / full.ssr;

    let f_stat = gain / lag as f64 * df_den;
    let f_dist = FisherSnedecor::new(lag as f64, df_den).map_err(dist_err)?;

    let chi2_stat = down.nobs as f64 * gain;
    let chi2 = ChiSquared::new(lag as f64).map_err(dist_err)?;

    let lr_stat = -2.0 * (down.llf() - full.llf());

    Ok(GrangerLagResult {
        lag,
        ssr_ftest: TestStatistic { statistic: f_stat, p_value: f_dist.sf(f_stat), df: lag },
        ssr_ftest_df_den: df_den as usize,
        ssr_chi2test: TestStatistic { statistic: chi2_stat, p_value: chi2.sf(chi2_stat), df: lag },
        lrtest: TestStatistic { statistic: lr_stat, p_value: chi2.sf(lr_stat), df: lag },
    })
}
