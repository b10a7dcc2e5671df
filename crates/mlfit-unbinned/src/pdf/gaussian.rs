//! Truncated Gaussian PDF.
//!
//! The closed-form integral is the difference of two normal CDF values, so normalization
//! never falls back to Monte Carlo.

use crate::integration::{
    AnalyticIntegral, DEFAULT_PRIORITY, IntegralArgs, IntegralCapabilities, IntegralFn,
};
use crate::pdf::{Pdf, param_value, single_axis};
use mlfit_core::{Error, Parameter, Result, Space};
use statrs::distribution::{ContinuousCDF, Normal};
use std::sync::Arc;

/// Gaussian shape `exp(-(x - μ)² / 2σ²)`, normalized on the fit range.
///
/// Registers its closed-form integral (via the normal CDF) on the whole real line, so any
/// finite or infinite normalization range is integrated analytically.
#[derive(Debug, Clone)]
pub struct GaussianPdf {
    name: String,
    space: Space,
    mu: Parameter,
    sigma: Parameter,
    integrals: AnalyticIntegral,
}

impl GaussianPdf {
    /// Create a Gaussian over the one-dimensional `space`.
    pub fn new(space: Space, mu: Parameter, sigma: Parameter) -> Result<Self> {
        let axis = single_axis(&space, "GaussianPdf")?;
        let mut integrals = AnalyticIntegral::new();
        let (mu_name, sigma_name) = (mu.name().to_string(), sigma.name().to_string());
        let func: IntegralFn = Arc::new(move |args: &IntegralArgs<'_>| {
            let mu = param_value(args.params, &mu_name)?;
            let sigma = check_sigma(param_value(args.params, &sigma_name)?)?;
            let total = args
                .limits
                .boxes()
                .map(|(lo, hi)| gaussian_integral(mu, sigma, lo[0], hi[0]))
                .sum::<f64>();
            Ok(vec![total])
        });
        let real_line = Space::interval(axis, f64::NEG_INFINITY, f64::INFINITY)?;
        integrals.register(
            func,
            &real_line,
            DEFAULT_PRIORITY,
            IntegralCapabilities { norm_range: false, multiple_limits: true },
        )?;
        Ok(Self { name: "Gaussian".into(), space, mu, sigma, integrals })
    }
}

fn check_sigma(sigma: f64) -> Result<f64> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(Error::Validation(format!("GaussianPdf requires sigma > 0, got {sigma}")));
    }
    Ok(sigma)
}

/// `∫_a^b exp(-(x - μ)² / 2σ²) dx`.
fn gaussian_integral(mu: f64, sigma: f64, a: f64, b: f64) -> f64 {
    let normal = Normal::standard();
    let z = normal.cdf((b - mu) / sigma) - normal.cdf((a - mu) / sigma);
    z * sigma * (2.0 * std::f64::consts::PI).sqrt()
}

impl Pdf for GaussianPdf {
    fn name(&self) -> &str {
        &self.name
    }

    fn space(&self) -> &Space {
        &self.space
    }

    fn norm_range(&self) -> &Space {
        &self.space
    }

    fn params(&self) -> Vec<Parameter> {
        vec![self.mu.clone(), self.sigma.clone()]
    }

    fn unnormalized_pdf(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let mu = self.mu.value();
        let sigma = check_sigma(self.sigma.value())?;
        let xs = x.first().ok_or_else(|| Error::Validation("GaussianPdf expects 1 column".into()))?;
        Ok(xs.iter().map(|&v| (-0.5 * ((v - mu) / sigma).powi(2)).exp()).collect())
    }

    fn analytic_integrals(&self) -> Option<&AnalyticIntegral> {
        Some(&self.integrals)
    }
}
