//! Ordinary least squares shared by the ADF, VAR and Granger estimators.

use crate::error::{AnalysisError, AnalysisResult};
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

/// A fitted single-equation regression.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub params:  DVector<f64>,
    pub resid:   DVector<f64>,
    pub ssr:     f64,
    pub nobs:    usize,
    /// (X'X)^-1, kept for standard errors and Wald tests.
    pub xtx_inv: DMatrix<f64>,
}

impl OlsFit {
    pub fn k(&self) -> usize { self.params.len() }

    pub fn df_resid(&self) -> f64 { self.nobs as f64 - self.k() as f64 }

    /// Residual variance with degrees-of-freedom correction.
    pub fn sigma2(&self) -> f64 { self.ssr / self.df_resid() }

    pub fn std_errors(&self) -> DVector<f64> {
        let s2 = self.sigma2();
        DVector::from_iterator(self.k(), (0..self.k()).map(|i| (s2 * self.xtx_inv[(i, i)]).sqrt()))
    }

    pub fn t_value(&self, i: usize) -> f64 {
        self.params[i] / (self.sigma2() * self.xtx_inv[(i, i)]).sqrt()
    }

    /// Gaussian log-likelihood at the MLE variance.
    pub fn llf(&self) -> f64 {
        let n = self.nobs as f64;
        -n / 2.0 * ((2.0 * PI).ln() + (self.ssr / n).ln() + 1.0)
    }

    pub fn aic(&self) -> f64 {
        -2.0 * self.llf() + 2.0 * self.k() as f64
    }
}

/// Fit y = X b + e.
pub fn ols(x: &DMatrix<f64>, y: &DVector<f64>, context: &'static str) -> AnalysisResult<OlsFit> {
    if x.nrows() != y.len() {
        return Err(AnalysisError::ShapeMismatch { expected: x.nrows(), actual: y.len() });
    }
    if x.nrows() <= x.ncols() {
        return Err(AnalysisError::InsufficientData(format!(
            "{context}: {} observations for {} regressors",
            x.nrows(),
            x.ncols()
        )));
    }
    let xt = x.transpose();
    let xtx_inv = (&xt * x)
        .try_inverse()
        .ok_or(AnalysisError::SingularMatrix { context })?;
    let params = &xtx_inv * (&xt * y);
    let resid = y - x * &params;
    let ssr = resid.dot(&resid);
    Ok(OlsFit { params, resid, ssr, nobs: x.nrows(), xtx_inv })
}

/// Multi-equation least squares with a shared regressor matrix:
/// returns (B, (Z'Z)^-1) with B of shape (regressors x equations).
pub fn ols_multi(
    z: &DMatrix<f64>,
    y: &DMatrix<f64>,
    context: &'static str,
) -> AnalysisResult<(DMatrix<f64>, DMatrix<f64>)> {
    if z.nrows() != y.nrows() {
        return Err(AnalysisError::ShapeMismatch { expected: z.nrows(), actual: y.nrows() });
    }
    let zt = z.transpose();
    let ztz_inv = (&zt * z)
        .try_inverse()
        .ok_or(AnalysisError::SingularMatrix { context })?;
    let b = &ztz_inv * (&zt * y);
    Ok((b, ztz_inv))
}
