//! Exponential PDF with an analytic integral wherever `exp(λ x)` converges.

use crate::integration::{
    AnalyticIntegral, DEFAULT_PRIORITY, IntegralArgs, IntegralCapabilities, IntegralFn,
};
use crate::pdf::{Pdf, param_value, single_axis};
use mlfit_core::{Error, Parameter, Result, Space};
use std::sync::Arc;

/// Exponential-family shape `exp(λ x)`, normalized on the fit range.
///
/// This is a convenient HEP background shape; unlike the "rate-parameter exponential",
/// `λ` is allowed to be any real number.
#[derive(Debug, Clone)]
pub struct ExponentialPdf {
    name: String,
    space: Space,
    lambda: Parameter,
    integrals: AnalyticIntegral,
}

impl ExponentialPdf {
    /// Create an exponential over the one-dimensional `space`.
    pub fn new(space: Space, lambda: Parameter) -> Result<Self> {
        let axis = single_axis(&space, "ExponentialPdf")?;
        let lambda_name = lambda.name().to_string();
        let func: IntegralFn = Arc::new(move |args: &IntegralArgs<'_>| {
            let lambda = param_value(args.params, &lambda_name)?;
            let mut total = 0.0;
            for (lo, hi) in args.limits.boxes() {
                total += log_integral(lambda, lo[0], hi[0])?.exp();
            }
            Ok(vec![total])
        });
        let mut integrals = AnalyticIntegral::new();
        integrals.register(
            func,
            &Space::interval(axis, f64::NEG_INFINITY, f64::INFINITY)?,
            DEFAULT_PRIORITY,
            IntegralCapabilities { norm_range: false, multiple_limits: true },
        )?;
        Ok(Self { name: "Exponential".into(), space, lambda, integrals })
    }
}

impl Pdf for ExponentialPdf {
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
        vec![self.lambda.clone()]
    }

    fn unnormalized_pdf(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let lambda = self.lambda.value();
        let xs =
            x.first().ok_or_else(|| Error::Validation("ExponentialPdf expects 1 column".into()))?;
        Ok(xs.iter().map(|&v| (lambda * v).exp()).collect())
    }

    fn analytic_integrals(&self) -> Option<&AnalyticIntegral> {
        Some(&self.integrals)
    }
}

/// `log ∫_a^b exp(λ x) dx`.
fn log_integral(lambda: f64, a: f64, b: f64) -> Result<f64> {
    // Small-λ limit: uniform on [a,b].
    if lambda.abs() < 1e-12 {
        let z = b - a;
        if !(z.is_finite() && z > 0.0) {
            return Err(Error::Validation(format!(
                "ExponentialPdf with lambda ~ 0 is not integrable on ({a}, {b})"
            )));
        }
        return Ok(z.ln());
    }

    let (t_a, t_b) = (lambda * a, lambda * b);
    let (hi_t, lo_t) = if t_b >= t_a { (t_b, t_a) } else { (t_a, t_b) };
    if hi_t == f64::INFINITY {
        return Err(Error::Validation(format!(
            "ExponentialPdf with lambda={lambda} is not integrable on ({a}, {b})"
        )));
    }
    Ok(log_diff_exp(hi_t, lo_t) - lambda.abs().ln())
}

/// `log(exp(a) - exp(b))` for `a >= b`.
fn log_diff_exp(a: f64, b: f64) -> f64 {
    if b == f64::NEG_INFINITY {
        return a;
    }
    a + (-(b - a).exp()).ln_1p()
}
