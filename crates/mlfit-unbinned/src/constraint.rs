//! Constraint (penalty) terms on parameters.

use mlfit_core::{Error, Parameter, Result};
use statrs::function::gamma::ln_gamma;

/// Prior density evaluated at a parameter's current value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prior {
    /// Gaussian prior.
    Gaussian {
        /// Constraint mean.
        mean: f64,
        /// Constraint sigma (standard deviation), must be finite and > 0.
        sigma: f64,
    },
    /// Poisson prior with the parameter as rate: `P(observed | λ = value)`.
    Poisson {
        /// Observed count (finite, >= 0).
        observed: f64,
    },
}

impl Prior {
    /// `-ln prior(x)`.
    pub fn nll(&self, x: f64) -> Result<f64> {
        match *self {
            Prior::Gaussian { mean, sigma } => {
                let z = (x - mean) / sigma;
                Ok(0.5 * z * z + (sigma.ln() + 0.5 * (2.0 * std::f64::consts::PI).ln()))
            }
            Prior::Poisson { observed } => {
                if x < 0.0 || (x == 0.0 && observed > 0.0) {
                    return Err(Error::Computation(format!(
                        "Poisson constraint with observed={observed} undefined at rate {x}"
                    )));
                }
                let k_ln_x = if observed == 0.0 { 0.0 } else { observed * x.ln() };
                Ok(x - k_ln_x + ln_gamma(observed + 1.0))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            Prior::Gaussian { mean, sigma } => {
                if !mean.is_finite() || !sigma.is_finite() || sigma <= 0.0 {
                    return Err(Error::Validation(format!(
                        "Gaussian constraint requires finite mean and sigma > 0, got ({mean}, {sigma})"
                    )));
                }
            }
            Prior::Poisson { observed } => {
                if !observed.is_finite() || observed < 0.0 {
                    return Err(Error::Validation(format!(
                        "Poisson constraint requires observed >= 0, got {observed}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A prior attached to a parameter; contributes `-ln prior(param)` to a loss.
#[derive(Debug, Clone)]
pub struct Constraint {
    param: Parameter,
    prior: Prior,
}

impl Constraint {
    /// Constrain `param` with `prior`.
    pub fn new(param: Parameter, prior: Prior) -> Result<Self> {
        prior.validate()?;
        Ok(Self { param, prior })
    }

    /// Gaussian constraint.
    pub fn gaussian(param: Parameter, mean: f64, sigma: f64) -> Result<Self> {
        Self::new(param, Prior::Gaussian { mean, sigma })
    }

    /// Poisson constraint.
    pub fn poisson(param: Parameter, observed: f64) -> Result<Self> {
        Self::new(param, Prior::Poisson { observed })
    }

    /// Constrained parameter.
    pub fn param(&self) -> &Parameter {
        &self.param
    }

    /// Prior.
    pub fn prior(&self) -> &Prior {
        &self.prior
    }

    /// `-ln prior` at the parameter's current value.
    pub fn nll(&self) -> Result<f64> {
        self.prior.nll(self.param.value())
    }
}

/// Same parameter handle and same prior.
impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.param.ptr_eq(&other.param) && self.prior == other.prior
    }
}

/// Sum of `-ln prior` over `constraints` (0 for none).
pub fn constraints_nll(constraints: &[Constraint]) -> Result<f64> {
    constraints.iter().map(Constraint::nll).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use statrs::distribution::{Continuous, Discrete, Normal, Poisson};

    #[test]
    fn test_gaussian_matches_statrs() {
        let p = Parameter::new("alpha", 0.3).unwrap();
        let c = Constraint::gaussian(p, 0.0, 0.5).unwrap();
        let expected = -Normal::new(0.0, 0.5).unwrap().ln_pdf(0.3);
        assert_relative_eq!(c.nll().unwrap(), expected, max_relative = 1e-12);
    }

    #[test]
    fn test_poisson_matches_statrs() {
        let p = Parameter::bounded("rate", 12.5, 0.0, 100.0).unwrap();
        let c = Constraint::poisson(p.clone(), 10.0).unwrap();
        let expected = -Poisson::new(12.5).unwrap().ln_pmf(10);
        assert_relative_eq!(c.nll().unwrap(), expected, max_relative = 1e-10);

        p.set_value(0.0).unwrap();
        assert!(c.nll().is_err());
        let zero = Constraint::poisson(p, 0.0).unwrap();
        assert!(zero.nll().unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_empty_sum_is_zero() {
        assert_eq!(constraints_nll(&[]).unwrap(), 0.0);
    }

    #[test]
    fn test_invalid_priors() {
        let p = Parameter::new("x", 0.0).unwrap();
        assert!(Constraint::gaussian(p.clone(), 0.0, 0.0).is_err());
        assert!(Constraint::poisson(p, -1.0).is_err());
    }
}
