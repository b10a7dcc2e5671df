//! Hessian-based parameter uncertainties.
//!
//! [`hesse`] differentiates the loss gradient numerically at the minimum of a fit result,
//! inverts the symmetrised Hessian and scales it by `2 · errordef(1)` so that one standard
//! deviation corresponds to the loss' own error definition.

use mlfit_core::{Error, FitResult, Loss, Parameter, Result};
use nalgebra::DMatrix;

/// Attach covariance and uncertainties to `result`.
///
/// Parameters are moved to the result values while differentiating and restored to their
/// previous values afterwards. Fails with [`Error::ErrordefUnavailable`] for losses without
/// an error definition, and with [`Error::Computation`] if the Hessian cannot be inverted.
pub fn hesse(loss: &dyn Loss, result: &FitResult) -> Result<FitResult> {
    let errordef = loss.errordef(1.0)?;
    let params: Vec<Parameter> = result.params().iter().map(|(p, _)| p.clone()).collect();
    let best: Vec<f64> = result.params().iter().map(|&(_, v)| v).collect();
    let n = params.len();
    if n == 0 {
        return Err(Error::Validation("fit result has no parameters".to_string()));
    }

    let saved: Vec<f64> = params.iter().map(Parameter::value).collect();
    let hessian = compute_hessian(loss, &params, &best);
    for (p, &v) in params.iter().zip(&saved) {
        p.set_value(v)?;
    }
    let hessian = hessian?;

    let cov = invert_hessian(&hessian, n).ok_or_else(|| {
        log::warn!("Hessian of loss '{}' is not invertible at the minimum", loss.name());
        Error::Computation(format!("Hessian of loss '{}' is not invertible", loss.name()))
    })?;

    let scale = 2.0 * errordef;
    let covariance: Vec<f64> =
        (0..n).flat_map(|i| (0..n).map(move |j| (i, j))).map(|(i, j)| cov[(i, j)] * scale).collect();
    result.clone().with_covariance(covariance)
}

/// Full Hessian by forward differences of the loss gradient.
///
/// H_{ij} ≈ (g_i(x + ε·e_j) − g_i(x)) / ε, then symmetrised.
fn compute_hessian(loss: &dyn Loss, params: &[Parameter], best: &[f64]) -> Result<DMatrix<f64>> {
    let n = best.len();
    for (p, &v) in params.iter().zip(best) {
        p.set_value_clamped(v)?;
    }
    let grad_center = loss.gradient(params)?;

    let mut hessian = DMatrix::zeros(n, n);
    for j in 0..n {
        let mut eps = 1e-4 * best[j].abs().max(1.0);
        // Step inwards when the upper bound is too close.
        if params[j].clamp(best[j] + eps) < best[j] + eps {
            eps = -eps;
        }
        params[j].set_value_clamped(best[j] + eps)?;
        let grad_shift = loss.gradient(params)?;
        params[j].set_value_clamped(best[j])?;

        for i in 0..n {
            hessian[(i, j)] = (grad_shift[i] - grad_center[i]) / eps;
        }
    }

    let ht = hessian.transpose();
    hessian = (&hessian + &ht) * 0.5;
    if hessian.iter().any(|v| !v.is_finite()) {
        return Err(Error::Computation("non-finite Hessian element".to_string()));
    }
    Ok(hessian)
}

/// Invert the Hessian via a damped Cholesky decomposition.
///
/// Returns `None` if no positive variances can be obtained.
fn invert_hessian(hessian: &DMatrix<f64>, n: usize) -> Option<DMatrix<f64>> {
    let identity = DMatrix::identity(n, n);

    // Damping is scaled to the Hessian diagonal.
    let diag_scale = (0..n).map(|i| hessian[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);

    let mut h_damped = hessian.clone();
    let mut damping = 0.0_f64;
    let max_attempts = 10;

    for attempt in 0..max_attempts {
        if let Some(chol) = nalgebra::linalg::Cholesky::new(h_damped.clone()) {
            return Some(chol.solve(&identity));
        }
        if attempt + 1 == max_attempts {
            break;
        }
        let next_damping = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
        let add = next_damping - damping;
        for i in 0..n {
            h_damped[(i, i)] += add;
        }
        damping = next_damping;
    }

    let cov = h_damped.lu().try_inverse()?;
    (0..n).all(|i| cov[(i, i)].is_finite() && cov[(i, i)] > 0.0).then_some(cov)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mlfit_core::FitStatus;

    /// NLL of a bivariate normal: 0.5·(x²/σx² + y²/σy²) with correlation-free axes.
    struct Quadratic {
        x: Parameter,
        y: Parameter,
        errordef_scale: Option<f64>,
    }

    impl Loss for Quadratic {
        fn name(&self) -> &str {
            "Quadratic"
        }

        fn value(&self) -> Result<f64> {
            let (x, y) = (self.x.value(), self.y.value());
            Ok(0.5 * ((x - 1.0).powi(2) / 4.0 + (y + 2.0).powi(2) / 0.25))
        }

        fn get_dependents(&self, _only_floating: bool) -> Vec<Parameter> {
            vec![self.x.clone(), self.y.clone()]
        }

        fn errordef(&self, sigma: f64) -> Result<f64> {
            self.errordef_scale
                .map(|s| s * sigma * sigma)
                .ok_or_else(|| Error::ErrordefUnavailable("no errordef".to_string()))
        }
    }

    fn fitted(loss: &Quadratic) -> FitResult {
        FitResult::new(
            vec![(loss.x.clone(), 1.0), (loss.y.clone(), -2.0)],
            0.0,
            FitStatus::Converged,
            loss.name(),
            "test",
        )
    }

    #[test]
    fn test_uncertainties_match_nll_widths() {
        let loss = Quadratic {
            x: Parameter::new("x", 0.3).unwrap(),
            y: Parameter::new("y", 0.7).unwrap(),
            errordef_scale: Some(0.5),
        };
        let result = hesse(&loss, &fitted(&loss)).unwrap();
        let unc = result.uncertainties().unwrap();
        assert_relative_eq!(unc[0], 2.0, epsilon = 1e-3);
        assert_relative_eq!(unc[1], 0.5, epsilon = 1e-3);
        assert!(result.correlation(0, 1).unwrap().abs() < 1e-3);
        // Parameter values restored.
        assert_eq!(loss.x.value(), 0.3);
        assert_eq!(loss.y.value(), 0.7);
    }

    #[test]
    fn test_chi2_errordef_scales_covariance() {
        let loss = Quadratic {
            x: Parameter::new("x", 1.0).unwrap(),
            y: Parameter::new("y", -2.0).unwrap(),
            errordef_scale: Some(1.0),
        };
        let result = hesse(&loss, &fitted(&loss)).unwrap();
        assert_relative_eq!(result.uncertainties().unwrap()[0], 2.0 * 2f64.sqrt(), epsilon = 1e-3);
    }

    #[test]
    fn test_errordef_unavailable_propagates() {
        let loss = Quadratic {
            x: Parameter::new("x", 1.0).unwrap(),
            y: Parameter::new("y", -2.0).unwrap(),
            errordef_scale: None,
        };
        let err = hesse(&loss, &fitted(&loss)).unwrap_err();
        assert!(matches!(err, Error::ErrordefUnavailable(_)));
    }

    #[test]
    fn test_invert_rejects_negative_definite() {
        let h = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, -2.0]);
        assert!(invert_hessian(&h, 2).is_none());
    }
}
