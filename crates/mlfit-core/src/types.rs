//! Common data types for mlfit

use crate::parameter::Parameter;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Terminal state of a minimization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FitStatus {
    /// The convergence criterion was met.
    Converged,
    /// Minimization stopped without meeting the convergence criterion.
    Failed {
        /// Why the minimization stopped.
        reason: String,
    },
}

/// Fit result containing parameter estimates and minimizer diagnostics.
///
/// Built once by a minimizer; the builder methods consume the value, so a published result
/// is never mutated.
#[derive(Debug, Clone)]
pub struct FitResult {
    params: Vec<(Parameter, f64)>,
    fmin: f64,
    edm: Option<f64>,
    status: FitStatus,
    info: BTreeMap<String, serde_json::Value>,
    loss: String,
    minimizer: String,
    uncertainties: Option<Vec<f64>>,
    covariance: Option<Vec<f64>>,
}

/// Serializable view of a [`FitResult`].
#[derive(Debug, Clone, Serialize)]
pub struct FitSummary {
    /// `(name, value)` per fitted parameter, in fit order.
    pub params: Vec<(String, f64)>,
    /// Objective value at the minimum.
    pub fmin: f64,
    /// Estimated distance to minimum, if the backend reports one.
    pub edm: Option<f64>,
    /// Convergence flag.
    pub converged: bool,
    /// Terminal state.
    pub status: FitStatus,
    /// Backend diagnostics.
    pub info: BTreeMap<String, serde_json::Value>,
    /// Loss name.
    pub loss: String,
    /// Minimizer name.
    pub minimizer: String,
    /// Parameter uncertainties, if computed.
    pub uncertainties: Option<Vec<f64>>,
}

impl FitResult {
    /// Create a new fit result
    pub fn new(
        params: Vec<(Parameter, f64)>,
        fmin: f64,
        status: FitStatus,
        loss: impl Into<String>,
        minimizer: impl Into<String>,
    ) -> Self {
        Self {
            params,
            fmin,
            edm: None,
            status,
            info: BTreeMap::new(),
            loss: loss.into(),
            minimizer: minimizer.into(),
            uncertainties: None,
            covariance: None,
        }
    }

    /// Attach an estimated distance to minimum.
    pub fn with_edm(mut self, edm: f64) -> Self {
        self.edm = Some(edm);
        self
    }

    /// Attach a diagnostic entry.
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    /// Attach a covariance matrix (row-major, N×N) and the uncertainties derived from its
    /// diagonal.
    ///
    /// Fails with [`Error::Validation`] unless the matrix has exactly N×N entries.
    pub fn with_covariance(mut self, covariance: Vec<f64>) -> Result<Self> {
        let n = self.params.len();
        if covariance.len() != n * n {
            return Err(Error::Validation(format!(
                "covariance of {n} parameters needs {} entries, got {}",
                n * n,
                covariance.len()
            )));
        }
        self.uncertainties = Some((0..n).map(|i| covariance[i * n + i].max(0.0).sqrt()).collect());
        self.covariance = Some(covariance);
        Ok(self)
    }

    /// Attach uncertainties without a full covariance matrix, one per parameter.
    pub fn with_uncertainties(mut self, uncertainties: Vec<f64>) -> Result<Self> {
        if uncertainties.len() != self.params.len() {
            return Err(Error::Validation(format!(
                "expected {} uncertainties, got {}",
                self.params.len(),
                uncertainties.len()
            )));
        }
        self.uncertainties = Some(uncertainties);
        Ok(self)
    }

    /// Fitted parameters and their values, in fit order.
    pub fn params(&self) -> &[(Parameter, f64)] {
        &self.params
    }

    /// Fitted value of `param`, if it was part of the fit.
    pub fn value(&self, param: &Parameter) -> Option<f64> {
        self.params.iter().find(|(p, _)| p.ptr_eq(param)).map(|(_, v)| *v)
    }

    /// Fitted value of the first parameter called `name`.
    pub fn value_by_name(&self, name: &str) -> Option<f64> {
        self.params.iter().find(|(p, _)| p.name() == name).map(|(_, v)| *v)
    }

    /// Objective value at the minimum.
    pub fn fmin(&self) -> f64 {
        self.fmin
    }

    /// Estimated distance to minimum, `None` if unavailable.
    pub fn edm(&self) -> Option<f64> {
        self.edm
    }

    /// Convergence flag.
    pub fn converged(&self) -> bool {
        self.status == FitStatus::Converged
    }

    /// Terminal state.
    pub fn status(&self) -> &FitStatus {
        &self.status
    }

    /// Backend diagnostics.
    pub fn info(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.info
    }

    /// Name of the loss that was minimized.
    pub fn loss_name(&self) -> &str {
        &self.loss
    }

    /// Name of the minimizer that produced the result.
    pub fn minimizer_name(&self) -> &str {
        &self.minimizer
    }

    /// Parameter uncertainties (sqrt of covariance diagonal), if computed.
    pub fn uncertainties(&self) -> Option<&[f64]> {
        self.uncertainties.as_deref()
    }

    /// Covariance matrix (row-major), if computed.
    pub fn covariance(&self) -> Option<&[f64]> {
        self.covariance.as_deref()
    }

    /// Get correlation matrix element (i, j). Returns `None` if covariance is unavailable.
    pub fn correlation(&self, i: usize, j: usize) -> Option<f64> {
        let cov = self.covariance.as_ref()?;
        let sigmas = self.uncertainties.as_ref()?;
        let n = self.params.len();
        if i >= n || j >= n {
            return None;
        }
        let sigma_i = sigmas[i];
        let sigma_j = sigmas[j];
        if sigma_i <= 0.0 || sigma_j <= 0.0 {
            return None;
        }
        Some(cov[i * n + j] / (sigma_i * sigma_j))
    }

    /// Serializable view.
    pub fn summary(&self) -> FitSummary {
        FitSummary {
            params: self.params.iter().map(|(p, v)| (p.name().to_string(), *v)).collect(),
            fmin: self.fmin,
            edm: self.edm,
            converged: self.converged(),
            status: self.status.clone(),
            info: self.info.clone(),
            loss: self.loss.clone(),
            minimizer: self.minimizer.clone(),
            uncertainties: self.uncertainties.clone(),
        }
    }

    /// JSON rendering of [`FitResult::summary`].
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.summary())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_params() -> (Parameter, Parameter) {
        (Parameter::new("a", 1.0).unwrap(), Parameter::new("b", 2.0).unwrap())
    }

    #[test]
    fn test_fit_result() {
        let (a, b) = two_params();
        let result = FitResult::new(
            vec![(a.clone(), 1.5), (b.clone(), 2.5)],
            123.45,
            FitStatus::Converged,
            "UnbinnedNll",
            "Test",
        );
        assert_eq!(result.params().len(), 2);
        assert!(result.converged());
        assert_eq!(result.value(&a), Some(1.5));
        assert_eq!(result.value_by_name("b"), Some(2.5));
        assert_eq!(result.edm(), None);
        assert!(result.uncertainties().is_none());
    }

    #[test]
    fn test_covariance_and_correlation() {
        let (a, b) = two_params();
        let result = FitResult::new(vec![(a, 0.0), (b, 0.0)], 0.0, FitStatus::Converged, "l", "m")
            .with_covariance(vec![4.0, 1.0, 1.0, 1.0])
            .unwrap();
        let unc = result.uncertainties().unwrap();
        assert_relative_eq!(unc[0], 2.0);
        assert_relative_eq!(unc[1], 1.0);
        assert_relative_eq!(result.correlation(0, 1).unwrap(), 0.5);
        assert!(result.correlation(0, 2).is_none());
    }

    #[test]
    fn test_covariance_shape_mismatch_rejected() {
        let (a, b) = two_params();
        let result = FitResult::new(vec![(a, 0.0), (b, 0.0)], 0.0, FitStatus::Converged, "l", "m");
        let err = result.clone().with_covariance(vec![4.0, 1.0, 1.0]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(result.clone().with_covariance(vec![]).is_err());
        assert!(matches!(result.with_uncertainties(vec![1.0]), Err(Error::Validation(_))));
    }

    #[test]
    fn test_summary_json() {
        let (a, _) = two_params();
        let result = FitResult::new(
            vec![(a, 3.0)],
            -10.0,
            FitStatus::Failed { reason: "max iterations".into() },
            "SimpleLoss",
            "Stepper",
        )
        .with_info("n_iter", 42);
        assert!(!result.converged());
        let json = result.to_json().unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["status"]["state"], "failed");
        assert_eq!(v["info"]["n_iter"], 42);
        assert_eq!(v["params"][0][0], "a");
    }
}
