//! Full minimization through argmin.
//!
//! [`LbfgsMinimizer`] hands a [`Loss`] straight to argmin's L-BFGS (More–Thuente line search)
//! as its `minimize_full` strategy. Every trial point is clamped into the parameter bounds
//! and written into the parameters before the loss is evaluated.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use mlfit_core::{Error, FitResult, FitStatus, Loss, Parameter, Result};

use crate::minimizer::{Minimizer, StepConfig, Strategy};

type Solver = LBFGS<MoreThuenteLineSearch<Vec<f64>, Vec<f64>, f64>, Vec<f64>, Vec<f64>, f64>;

/// Slack within which a parameter counts as sitting on its bound.
const BOUND_EPS: f64 = 1e-12;

/// A loss seen by argmin as a function of the selected parameters.
struct LossProblem<'a> {
    loss: &'a dyn Loss,
    params: &'a [Parameter],
}

impl LossProblem<'_> {
    /// Clamp `x` into the bounds and move the parameters there.
    fn move_to(&self, x: &[f64]) -> Result<Vec<f64>> {
        let clamped: Vec<f64> = self.params.iter().zip(x).map(|(p, &v)| p.clamp(v)).collect();
        for (p, &v) in self.params.iter().zip(&clamped) {
            p.set_value(v)?;
        }
        Ok(clamped)
    }
}

impl CostFunction for LossProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Vec<f64>) -> std::result::Result<f64, argmin::core::Error> {
        self.move_to(x)?;
        Ok(self.loss.value()?)
    }
}

impl Gradient for LossProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Vec<f64>) -> std::result::Result<Vec<f64>, argmin::core::Error> {
        let at = self.move_to(x)?;
        let mut grad = self.loss.gradient(self.params)?;
        // A component pushing further out of an active bound cannot be followed.
        for ((g, p), v) in grad.iter_mut().zip(self.params).zip(at) {
            let (lo, hi) = p.bounds();
            if (v <= lo + BOUND_EPS && *g > 0.0) || (v >= hi - BOUND_EPS && *g < 0.0) {
                *g = 0.0;
            }
        }
        Ok(grad)
    }
}

/// [`Minimizer`] whose full strategy is argmin's L-BFGS.
///
/// The [`StepConfig`] tolerance bounds the gradient norm at convergence and
/// `max_iterations` caps the solver iterations.
pub struct LbfgsMinimizer {
    config: StepConfig,
    memory: usize,
}

impl LbfgsMinimizer {
    /// Create a minimizer keeping `memory` curvature pairs.
    pub fn new(config: StepConfig, memory: usize) -> Result<Self> {
        if memory == 0 {
            return Err(Error::Validation("L-BFGS memory must be > 0".to_string()));
        }
        config.validate()?;
        Ok(Self { config, memory })
    }

    fn solver(&self) -> Result<Solver> {
        let tol = self.config.tolerance;
        // argmin's default cost tolerance is machine epsilon, too strict at likelihood scale.
        let tol_cost = if tol == 0.0 { 0.0 } else { (0.1 * tol).max(1e-12) };
        LBFGS::new(MoreThuenteLineSearch::new(), self.memory)
            .with_tolerance_grad(tol)
            .and_then(|s| s.with_tolerance_cost(tol_cost))
            .map_err(|e| Error::Validation(format!("invalid L-BFGS tolerance {tol}: {e}")))
    }
}

impl Default for LbfgsMinimizer {
    fn default() -> Self {
        Self { config: StepConfig::default(), memory: 10 }
    }
}

impl Minimizer for LbfgsMinimizer {
    fn name(&self) -> &str {
        "LbfgsMinimizer"
    }

    fn config(&self) -> &StepConfig {
        &self.config
    }

    fn minimize_full(&mut self, loss: &dyn Loss, params: &[Parameter]) -> Result<FitResult> {
        let init: Vec<f64> = params.iter().map(|p| p.clamp(p.value())).collect();
        let max_iterations = self.config.max_iterations;
        let name = self.name().to_string();

        let res = Executor::new(LossProblem { loss, params }, self.solver()?)
            .configure(|state| state.param(init).max_iters(max_iterations))
            .run()
            .map_err(|e| match e.downcast::<Error>() {
                Ok(err) => err,
                Err(e) => Error::Computation(format!("{name} on loss '{}': {e}", loss.name())),
            })?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| Error::Computation(format!("{name} found no best point")))?;
        // Leave the parameters at the best point, not the last one evaluated.
        let best = LossProblem { loss, params }.move_to(best)?;
        let fmin = state.get_best_cost();

        let termination = state.get_termination_status();
        let message = termination.to_string();
        let status = match termination {
            TerminationStatus::Terminated(
                TerminationReason::SolverConverged | TerminationReason::TargetCostReached,
            ) if fmin.is_finite() => FitStatus::Converged,
            _ => {
                log::warn!("{name} did not converge on loss '{}': {message}", loss.name());
                FitStatus::Failed { reason: message.clone() }
            }
        };

        let counts = state.get_func_counts();
        let count = |key: &str| counts.get(key).copied().unwrap_or(0);
        let values = params.iter().cloned().zip(best).collect();
        Ok(FitResult::new(values, fmin, status, loss.name(), &name)
            .with_info("n_iter", state.get_iter())
            .with_info("n_eval", count("cost_count"))
            .with_info("n_grad", count("gradient_count"))
            .with_info("message", message)
            .with_info("strategy", Strategy::Full.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minimizer::ParamSelection;
    use approx::assert_relative_eq;

    /// (x - 2)² + (y - 3)² with the default numerical gradient.
    struct Bowl {
        x: Parameter,
        y: Parameter,
    }

    impl Loss for Bowl {
        fn name(&self) -> &str {
            "Bowl"
        }

        fn value(&self) -> Result<f64> {
            Ok((self.x.value() - 2.0).powi(2) + (self.y.value() - 3.0).powi(2))
        }

        fn get_dependents(&self, only_floating: bool) -> Vec<Parameter> {
            [&self.x, &self.y]
                .into_iter()
                .filter(|p| !only_floating || p.is_floating())
                .cloned()
                .collect()
        }

        fn errordef(&self, sigma: f64) -> Result<f64> {
            Ok(0.5 * sigma * sigma)
        }
    }

    fn bowl(x: Parameter, y: Parameter) -> Bowl {
        Bowl { x, y }
    }

    #[test]
    fn test_minimum_written_back() {
        let loss = bowl(Parameter::new("x", 0.0).unwrap(), Parameter::new("y", 0.0).unwrap());
        let mut minimizer = LbfgsMinimizer::default();
        let result = minimizer.minimize(&loss, ParamSelection::AllFloating).unwrap();

        assert!(result.converged(), "{:?}", result.status());
        assert_eq!(result.minimizer_name(), "LbfgsMinimizer");
        assert_eq!(result.loss_name(), "Bowl");
        assert_eq!(result.info()["strategy"], "full");
        assert!(result.info()["n_eval"].as_u64().unwrap() > 0);
        assert_relative_eq!(loss.x.value(), 2.0, epsilon = 1e-4);
        assert_relative_eq!(loss.y.value(), 3.0, epsilon = 1e-4);
        assert_relative_eq!(result.value(&loss.x).unwrap(), loss.x.value());
        assert_relative_eq!(result.fmin(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_bounds_hold_the_optimum() {
        let loss = bowl(
            Parameter::bounded("x", 4.0, 3.0, 5.0).unwrap(),
            Parameter::bounded("y", 1.5, 1.0, 2.0).unwrap(),
        );
        let mut minimizer = LbfgsMinimizer::default();
        let result = minimizer.minimize(&loss, ParamSelection::AllFloating).unwrap();

        assert_relative_eq!(result.value_by_name("x").unwrap(), 3.0, epsilon = 1e-4);
        assert_relative_eq!(result.value_by_name("y").unwrap(), 2.0, epsilon = 1e-4);
        assert!(loss.x.value() >= 3.0 && loss.y.value() <= 2.0);
    }

    #[test]
    fn test_respects_selection() {
        let loss = bowl(Parameter::new("x", 0.0).unwrap(), Parameter::new("y", 0.0).unwrap());
        let mut minimizer = LbfgsMinimizer::default();
        let result = minimizer.minimize(&loss, ParamSelection::from("y")).unwrap();

        assert_eq!(result.params().len(), 1);
        assert_eq!(loss.x.value(), 0.0);
        assert_relative_eq!(loss.y.value(), 3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_loss_error_keeps_its_kind() {
        struct Broken(Parameter);
        impl Loss for Broken {
            fn name(&self) -> &str {
                "Broken"
            }
            fn value(&self) -> Result<f64> {
                Err(Error::UnboundedLimits("cannot integrate".to_string()))
            }
            fn get_dependents(&self, _only_floating: bool) -> Vec<Parameter> {
                vec![self.0.clone()]
            }
            fn errordef(&self, sigma: f64) -> Result<f64> {
                Ok(0.5 * sigma * sigma)
            }
        }

        let loss = Broken(Parameter::new("x", 1.0).unwrap());
        let err =
            LbfgsMinimizer::default().minimize(&loss, ParamSelection::AllFloating).unwrap_err();
        assert!(matches!(err, Error::UnboundedLimits(_)), "{err}");
    }

    #[test]
    fn test_invalid_construction_rejected() {
        assert!(LbfgsMinimizer::new(StepConfig::default(), 0).is_err());
        let config = StepConfig { tolerance: -1.0, max_iterations: 10 };
        assert!(LbfgsMinimizer::new(config, 5).is_err());
    }
}
