//! Core traits for mlfit
//!
//! This module defines the seam between objective construction and minimization:
//! minimizers (mlfit-inference) only see the [`Loss`] trait, never the concrete models,
//! datasets or integrators that produce its value.

use crate::parameter::Parameter;
use crate::Result;

/// Scalar objective minimized by a minimizer.
///
/// Implementations read the current values of their dependent [`Parameter`]s; minimizers
/// move the parameters and re-evaluate.
pub trait Loss: Send + Sync {
    /// Loss name (stable, used in fit results).
    fn name(&self) -> &str;

    /// Evaluate the objective at the current parameter values.
    fn value(&self) -> Result<f64>;

    /// Parameters the loss depends on, ordered and free of duplicates.
    fn get_dependents(&self, only_floating: bool) -> Vec<Parameter>;

    /// Change of the objective corresponding to `sigma` standard deviations.
    fn errordef(&self, sigma: f64) -> Result<f64>;

    /// Gradient with respect to `params` (numerical if not overridden).
    ///
    /// Central differences, one-sided at a bound. Parameter values are restored before
    /// returning, also on error.
    fn gradient(&self, params: &[Parameter]) -> Result<Vec<f64>> {
        let mut grad = Vec::with_capacity(params.len());
        for p in params {
            let x0 = p.value();
            let eps = 1e-6 * x0.abs().max(1.0);
            let x_plus = p.clamp(x0 + eps);
            let x_minus = p.clamp(x0 - eps);
            if x_plus <= x_minus {
                grad.push(0.0);
                continue;
            }

            let diff = (|| -> Result<f64> {
                p.set_value(x_plus)?;
                let f_plus = self.value()?;
                p.set_value(x_minus)?;
                let f_minus = self.value()?;
                Ok(f_plus - f_minus)
            })();
            p.set_value(x0)?;
            grad.push(diff? / (x_plus - x_minus));
        }
        Ok(grad)
    }
}
