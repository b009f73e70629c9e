//! Vector autoregression: lag-order selection, estimation, Wald causality
//! tests and recursive forecasting.
//!
//! Model with constant: y_t = c + A_1 y_{t-1} + .. + A_p y_{t-p} + u_t.
//! Every equation shares the regressor row [1, y_{t-1}', .., y_{t-p}'], so
//! the whole system is one least-squares solve.
//!
//! Parameter layout (regressors x equations):
//!   row 0                -> intercept
//!   row 1 + (j-1)*k + i  -> coefficient on variable i at lag j

use crate::{
    error::{AnalysisError, AnalysisResult},
    frame::PriceFrame,
    ols::ols_multi,
    types::{AssetId, Date},
};
use chrono::Duration;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal};
use std::fmt::Write as _;

/// Significance level used for causality test conclusions.
pub const CAUSALITY_SIGNIFICANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InfoCriterion {
    Aic,
    Bic,
    Fpe,
    Hqic,
}

impl InfoCriterion {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aic  => "aic",
            Self::Bic  => "bic",
            Self::Fpe  => "fpe",
            Self::Hqic => "hqic",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CausalityKind {
    /// Wald statistic divided by the number of restrictions, F(q, k*df_resid).
    F,
    /// Raw Wald statistic, chi2(q).
    Wald,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InfoCriteria {
    pub aic:  f64,
    pub bic:  f64,
    pub hqic: f64,
    pub fpe:  f64,
}

impl InfoCriteria {
    pub fn get(&self, criterion: InfoCriterion) -> f64 {
        match criterion {
            InfoCriterion::Aic  => self.aic,
            InfoCriterion::Bic  => self.bic,
            InfoCriterion::Fpe  => self.fpe,
            InfoCriterion::Hqic => self.hqic,
        }
    }
}

/// Information criteria for every candidate lag 0..=maxlags.
#[derive(Debug, Clone, PartialEq)]
pub struct LagOrderSelection {
    pub maxlags:  usize,
    pub criteria: Vec<InfoCriteria>,
}

impl LagOrderSelection {
    /// Lag with the smallest value of `criterion`; ties go to the shorter lag.
    pub fn selected(&self, criterion: InfoCriterion) -> usize {
        let mut best = 0;
        for (lag, ic) in self.criteria.iter().enumerate() {
            let value = ic.get(criterion);
            let current = self.criteria[best].get(criterion);
            if value < current || (current.is_nan() && !value.is_nan()) {
                best = lag;
            }
        }
        best
    }

    pub fn summary(&self) -> String {
        let all = [InfoCriterion::Aic, InfoCriterion::Bic, InfoCriterion::Fpe, InfoCriterion::Hqic];
        let picks: Vec<usize> = all.iter().map(|c| self.selected(*c)).collect();
        let mut out = String::new();
        let _ = writeln!(out, " VAR Order Selection (* highlights the minimums)");
        let _ = writeln!(out, "{:>4} {:>14} {:>14} {:>14} {:>14}", "", "AIC", "BIC", "FPE", "HQIC");
        for (lag, ic) in self.criteria.iter().enumerate() {
            let _ = write!(out, "{lag:>4}");
            for (c, criterion) in all.iter().enumerate() {
                let mark = if picks[c] == lag { "*" } else { " " };
                let _ = write!(out, " {:>13.5}{mark}", ic.get(*criterion));
            }
            out.push('\n');
        }
        out
    }
}

/// Outcome of a Wald test on a block of lag coefficients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CausalityTest {
    pub caused:     Vec<AssetId>,
    pub causing:    Vec<AssetId>,
    pub kind:       CausalityKind,
    pub statistic:  f64,
    pub p_value:    f64,
    pub df_num:     usize,
    /// Denominator degrees of freedom, F tests only.
    pub df_den:     Option<usize>,
    pub crit_value: f64,
    pub reject:     bool,
}

impl CausalityTest {
    pub fn summary(&self) -> String {
        let verdict = if self.reject { "reject" } else { "do not reject" };
        format!(
            "Granger causality {}-test. H_0: {} does not Granger-cause {}. \
             Conclusion: {verdict} H_0 at {:.0}% significance level. \
             statistic={:.4} critical={:.4} p-value={:.4} df=({}, {})",
            match self.kind { CausalityKind::F => "F", CausalityKind::Wald => "Wald" },
            self.causing.join(", "),
            self.caused.join(", "),
            CAUSALITY_SIGNIFICANCE * 100.0,
            self.statistic,
            self.crit_value,
            self.p_value,
            self.df_num,
            self.df_den.map_or_else(|| "-".to_string(), |d| d.to_string()),
        )
    }
}

/// A VAR specification over the columns of a frame.
#[derive(Debug, Clone)]
pub struct VarModel {
    names: Vec<AssetId>,
    index: Vec<Date>,
    endog: DMatrix<f64>,
}

impl VarModel {
    pub fn new(frame: &PriceFrame) -> AnalysisResult<Self> {
        if frame.width() < 2 {
            return Err(AnalysisError::InsufficientData(
                "VAR needs at least two series".into(),
            ));
        }
        if !frame.is_finite() {
            return Err(AnalysisError::InsufficientData(
                "VAR input contains missing or non-finite values".into(),
            ));
        }
        let endog = DMatrix::from_fn(frame.len(), frame.width(), |r, c| frame.rows()[r][c]);
        Ok(Self {
            names: frame.columns().to_vec(),
            index: frame.index().to_vec(),
            endog,
        })
    }

    pub fn names(&self) -> &[AssetId] { &self.names }
    pub fn neqs(&self) -> usize { self.endog.ncols() }
    pub fn n_totobs(&self) -> usize { self.endog.nrows() }

    /// Largest lag whose model still has positive residual degrees of freedom.
    pub fn max_estimable_lag(&self) -> usize {
        let k = self.neqs();
        self.n_totobs().saturating_sub(k + 1) / (1 + k)
    }

    /// Compare lags 0..=maxlags on a common estimation sample.
    pub fn select_order(&self, maxlags: Option<usize>) -> AnalysisResult<LagOrderSelection> {
        let max_estimable = self.max_estimable_lag();
        let maxlags = match maxlags {
            Some(m) if m > max_estimable => {
                return Err(AnalysisError::InsufficientData(format!(
                    "maxlags={m} is too large for {} observations of {} series; the largest \
                     estimable lag is {max_estimable}",
                    self.n_totobs(),
                    self.neqs()
                )));
            }
            Some(m) => m,
            None => {
                let default = (12.0 * (self.n_totobs() as f64 / 100.0).powf(0.25)).round() as usize;
                default.min(max_estimable)
            }
        };

        let criteria = (0..=maxlags)
            .map(|p| self.estimate(p, maxlags - p).map(|r| r.info_criteria()))
            .collect::<AnalysisResult<Vec<_>>>()?;
        Ok(LagOrderSelection { maxlags, criteria })
    }

    pub fn fit(&self, lags: usize) -> AnalysisResult<VarResults> {
        self.estimate(lags, 0)
    }

    fn estimate(&self, lags: usize, offset: usize) -> AnalysisResult<VarResults> {
        let k = self.neqs();
        let n = self.n_totobs();
        let regressors = 1 + k * lags;
        if n < offset + lags + regressors + 1 {
            return Err(AnalysisError::InsufficientData(format!(
                "VAR({lags}) with {k} series needs more than {} observations, got {}",
                offset + lags + regressors,
                n
            )));
        }
        let endog = self.endog.rows(offset, n - offset).into_owned();
        let nobs = endog.nrows() - lags;

        let z = DMatrix::from_fn(nobs, regressors, |r, c| {
            if c == 0 {
                return 1.0;
            }
            let lag = (c - 1) / k + 1;
            let var = (c - 1) % k;
            endog[(lags + r - lag, var)]
        });
        let y = endog.rows(lags, nobs).into_owned();

        let (params, ztz_inv) = ols_multi(&z, &y, "var estimation")?;
        let resid = &y - &z * &params;
        let df_resid = nobs - regressors;
        let sigma_u = (resid.transpose() * &resid) / df_resid as f64;

        Ok(VarResults {
            names: self.names.clone(),
            index: self.index[offset..].to_vec(),
            endog,
            k_ar: lags,
            nobs,
            params,
            ztz_inv,
            sigma_u,
            resid,
        })
    }
}

/// A fitted VAR(p).
#[derive(Debug, Clone)]
pub struct VarResults {
    pub names:   Vec<AssetId>,
    /// Dates of `endog` rows.
    pub index:   Vec<Date>,
    /// Estimation data including the `k_ar` presample rows.
    pub endog:   DMatrix<f64>,
    pub k_ar:    usize,
    /// Effective observations after dropping the presample.
    pub nobs:    usize,
    pub params:  DMatrix<f64>,
    pub ztz_inv: DMatrix<f64>,
    /// Residual covariance with degrees-of-freedom correction.
    pub sigma_u: DMatrix<f64>,
    pub resid:   DMatrix<f64>,
}

impl VarResults {
    pub fn neqs(&self) -> usize { self.names.len() }

    pub fn df_model(&self) -> usize { 1 + self.neqs() * self.k_ar }

    pub fn df_resid(&self) -> usize { self.nobs - self.df_model() }

    pub fn intercept(&self) -> Vec<f64> {
        self.params.row(0).iter().copied().collect()
    }

    /// A_lag[eq, var], lag counted from 1. `None` outside 1..=k_ar or
    /// past the last variable.
    pub fn coef(&self, lag: usize, eq: usize, var: usize) -> Option<f64> {
        let k = self.neqs();
        if lag == 0 || lag > self.k_ar || eq >= k || var >= k {
            return None;
        }
        Some(self.lag_coef(lag, eq, var))
    }

    fn lag_coef(&self, lag: usize, eq: usize, var: usize) -> f64 {
        self.params[(1 + (lag - 1) * self.neqs() + var, eq)]
    }

    /// Standard errors, same layout as `params`.
    pub fn std_errors(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.params.nrows(), self.params.ncols(), |r, e| {
            (self.ztz_inv[(r, r)] * self.sigma_u[(e, e)]).sqrt()
        })
    }

    pub fn last_date(&self) -> Option<Date> { self.index.last().copied() }

    pub fn sigma_u_mle(&self) -> DMatrix<f64> {
        &self.sigma_u * (self.df_resid() as f64 / self.nobs as f64)
    }

    pub fn info_criteria(&self) -> InfoCriteria {
        let nobs = self.nobs as f64;
        let k = self.neqs() as f64;
        let free_params = (self.k_ar as f64) * k * k + k;
        let ld = log_det(&self.sigma_u_mle());
        let df_model = self.df_model() as f64;
        InfoCriteria {
            aic:  ld + (2.0 / nobs) * free_params,
            bic:  ld + (nobs.ln() / nobs) * free_params,
            hqic: ld + (2.0 * nobs.ln().ln() / nobs) * free_params,
            fpe:  ((nobs + df_model) / (nobs - df_model)).powf(k) * ld.exp(),
        }
    }

    fn position(&self, name: &str) -> AnalysisResult<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| AnalysisError::UnknownColumn { name: name.to_string() })
    }

    /// Recursive point forecast. `last` holds at least `k_ar` rows, oldest
    /// first; only the final `k_ar` rows are used.
    pub fn forecast(&self, last: &DMatrix<f64>, steps: usize) -> AnalysisResult<Vec<Vec<f64>>> {
        let k = self.neqs();
        let p = self.k_ar;
        if last.ncols() != k {
            return Err(AnalysisError::ShapeMismatch { expected: k, actual: last.ncols() });
        }
        if last.nrows() < p {
            return Err(AnalysisError::InsufficientData(format!(
                "forecast needs {p} prior observations, got {}",
                last.nrows()
            )));
        }
        let mut history: Vec<Vec<f64>> = (last.nrows() - p..last.nrows())
            .map(|r| last.row(r).iter().copied().collect())
            .collect();
        let mut out = Vec::with_capacity(steps);
        for _ in 0..steps {
            let mut next = self.intercept();
            for lag in 1..=p {
                let prior = &history[history.len() - lag];
                for (eq, value) in next.iter_mut().enumerate() {
                    for (var, x) in prior.iter().enumerate() {
                        *value += self.lag_coef(lag, eq, var) * x;
                    }
                }
            }
            history.push(next.clone());
            out.push(next);
        }
        Ok(out)
    }

    /// Forecast from the end of the estimation sample, dated daily from
    /// `start_date`.
    pub fn forecast_frame(&self, steps: usize, start_date: Date) -> AnalysisResult<PriceFrame> {
        let values = self.forecast(&self.endog, steps)?;
        let index = (0..steps)
            .map(|i| start_date + Duration::days(i as i64))
            .collect();
        PriceFrame::new(index, self.names.clone(), values)
    }

    /// Wald test that all lag coefficients of `causing` in the `caused`
    /// equations are zero.
    pub fn test_causality(
        &self,
        caused: &[&str],
        causing: &[&str],
        kind: CausalityKind,
    ) -> AnalysisResult<CausalityTest> {
        if self.k_ar == 0 {
            return Err(AnalysisError::InsufficientData(
                "causality test needs a VAR with at least one lag".into(),
            ));
        }
        if caused.is_empty() || causing.is_empty() {
            return Err(AnalysisError::InsufficientData(
                "causality test needs caused and causing variables".into(),
            ));
        }
        let k = self.neqs();
        let caused_idx = caused.iter().map(|n| self.position(n)).collect::<AnalysisResult<Vec<_>>>()?;
        let causing_idx = causing.iter().map(|n| self.position(n)).collect::<AnalysisResult<Vec<_>>>()?;

        // (regressor row, equation) of every restricted coefficient.
        let mut restricted = Vec::new();
        for lag in 1..=self.k_ar {
            for &ing in &causing_idx {
                for &ed in &caused_idx {
                    restricted.push((1 + (lag - 1) * k + ing, ed));
                }
            }
        }
        let q = restricted.len();
        let cb = DVector::from_iterator(q, restricted.iter().map(|&(r, e)| self.params[(r, e)]));
        let middle = DMatrix::from_fn(q, q, |a, b| {
            let (ra, ea) = restricted[a];
            let (rb, eb) = restricted[b];
            self.ztz_inv[(ra, rb)] * self.sigma_u[(ea, eb)]
        });
        let middle_inv = middle
            .try_inverse()
            .ok_or(AnalysisError::SingularMatrix { context: "causality test" })?;
        let wald = (cb.transpose() * middle_inv * &cb)[(0, 0)];

        let (statistic, p_value, crit_value, df_den) = match kind {
            CausalityKind::F => {
                let df_den = k * self.df_resid();
                let dist = FisherSnedecor::new(q as f64, df_den as f64)
                    .map_err(|e| AnalysisError::Distribution(e.to_string()))?;
                let stat = wald / q as f64;
                (stat, dist.sf(stat), dist.inverse_cdf(1.0 - CAUSALITY_SIGNIFICANCE), Some(df_den))
            }
            CausalityKind::Wald => {
                let dist = ChiSquared::new(q as f64)
                    .map_err(|e| AnalysisError::Distribution(e.to_string()))?;
                (wald, dist.sf(wald), dist.inverse_cdf(1.0 - CAUSALITY_SIGNIFICANCE), None)
            }
        };

        Ok(CausalityTest {
            caused: caused.iter().map(|s| s.to_string()).collect(),
            causing: causing.iter().map(|s| s.to_string()).collect(),
            kind,
            statistic,
            p_value,
            df_num: q,
            df_den,
            crit_value,
            reject: statistic > crit_value,
        })
    }

    /// Plain-text estimation report.
    pub fn summary(&self) -> String {
        let k = self.neqs();
        let ic = self.info_criteria();
        let se = self.std_errors();
        // Coefficient p-values use the asymptotic normal.
        let normal = Normal::new(0.0, 1.0).ok();

        let mut regressors = vec!["const".to_string()];
        for lag in 1..=self.k_ar {
            for name in &self.names {
                regressors.push(format!("L{lag}.{name}"));
            }
        }

        let mut out = String::new();
        let _ = writeln!(out, "  Summary of Regression Results");
        let _ = writeln!(out, "==================================");
        let _ = writeln!(out, "Model:                         VAR");
        let _ = writeln!(out, "Lags:                   {:>10}", self.k_ar);
        let _ = writeln!(out, "No. of Equations:       {:>10}", k);
        let _ = writeln!(out, "Nobs:                   {:>10}", self.nobs);
        let _ = writeln!(out, "AIC:                    {:>10.4}", ic.aic);
        let _ = writeln!(out, "BIC:                    {:>10.4}", ic.bic);
        let _ = writeln!(out, "HQIC:                   {:>10.4}", ic.hqic);
        let _ = writeln!(out, "FPE:                    {:>10.4e}", ic.fpe);
        let _ = writeln!(out, "Det(Omega_mle):         {:>10.4e}", self.sigma_u_mle().determinant());

        for (eq, name) in self.names.iter().enumerate() {
            let _ = writeln!(out, "\nResults for equation {name}");
            let _ = writeln!(
                out,
                "{:<16} {:>14} {:>12} {:>10} {:>8}",
                "", "coefficient", "std. error", "t-stat", "prob"
            );
            for (r, label) in regressors.iter().enumerate() {
                let coef = self.params[(r, eq)];
                let t = coef / se[(r, eq)];
                let prob = normal.as_ref().map_or(f64::NAN, |d| 2.0 * d.sf(t.abs()));
                let _ = writeln!(
                    out,
                    "{label:<16} {coef:>14.6} {:>12.6} {t:>10.3} {prob:>8.3}",
                    se[(r, eq)]
                );
            }
        }

        let _ = writeln!(out, "\nCorrelation matrix of residuals");
        for a in 0..k {
            let _ = write!(out, "{:<8}", self.names[a]);
            for b in 0..k {
                let corr = self.sigma_u[(a, b)] / (self.sigma_u[(a, a)] * self.sigma_u[(b, b)]).sqrt();
                let _ = write!(out, " {corr:>9.6}");
            }
            out.push('\n');
        }
        out
    }
}

fn log_det(m: &DMatrix<f64>) -> f64 {
    match m.clone().cholesky() {
        Some(chol) => 2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>(),
        None => m.determinant().ln(),
    }
}
