//! L-BFGS step minimizer.
//!
//! Implements [`Minimizer::gradient_step`]: each call performs one limited-memory BFGS
//! update (two-loop recursion over the stored curvature pairs), projects it onto the
//! parameter bounds and runs a backtracking Armijo line search. Convergence is left to the
//! generic step loop.

use std::collections::VecDeque;

use mlfit_core::{Error, Loss, Parameter, Result};

use crate::minimizer::{Minimizer, StepConfig};

/// Sufficient-decrease constant of the Armijo condition.
const ARMIJO_C1: f64 = 1e-4;
/// Maximum number of step halvings per line search.
const MAX_BACKTRACK: usize = 40;

/// One curvature pair of the inverse-Hessian approximation.
struct CurvaturePair {
    /// Position change `x_{k+1} - x_k`.
    s: Vec<f64>,
    /// Gradient change `g_{k+1} - g_k`.
    y: Vec<f64>,
    /// `1 / (s·y)`.
    rho: f64,
}

/// The `memory` most recent curvature pairs, oldest first.
struct History {
    pairs: VecDeque<CurvaturePair>,
    memory: usize,
}

impl History {
    fn new(memory: usize) -> Self {
        Self { pairs: VecDeque::with_capacity(memory), memory }
    }

    /// Store a pair if it keeps the approximation positive definite.
    fn record(&mut self, s: Vec<f64>, y: Vec<f64>) -> bool {
        let sy = dot(&s, &y);
        if !(sy > 1e-10) {
            return false;
        }
        if self.pairs.len() == self.memory {
            self.pairs.pop_front();
        }
        self.pairs.push_back(CurvaturePair { s, y, rho: 1.0 / sy });
        true
    }

    fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Two-loop recursion: `H⁻¹ g` with `H0 = γI` scaled by the newest pair.
    fn apply_inverse(&self, grad: &[f64]) -> Vec<f64> {
        let Some(newest) = self.pairs.back() else {
            return grad.to_vec();
        };

        let mut q = grad.to_vec();
        let mut alpha = Vec::with_capacity(self.pairs.len());
        for pair in self.pairs.iter().rev() {
            let a = pair.rho * dot(&pair.s, &q);
            q.iter_mut().zip(&pair.y).for_each(|(qj, yj)| *qj -= a * yj);
            alpha.push(a);
        }

        let yy = dot(&newest.y, &newest.y);
        let gamma = if yy > 1e-30 { dot(&newest.s, &newest.y) / yy } else { 1.0 };
        q.iter_mut().for_each(|v| *v *= gamma);

        for (pair, a) in self.pairs.iter().zip(alpha.into_iter().rev()) {
            let beta = pair.rho * dot(&pair.y, &q);
            q.iter_mut().zip(&pair.s).for_each(|(rj, sj)| *rj += (a - beta) * sj);
        }
        q
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Per-minimization L-BFGS state.
struct LbfgsState {
    x: Vec<f64>,
    prev_x: Option<Vec<f64>>,
    prev_grad: Option<Vec<f64>>,
    history: History,
    bounds: Vec<(f64, f64)>,
    n_fev: usize,
    n_gev: usize,
}

impl LbfgsState {
    fn new(params: &[Parameter], m: usize) -> Self {
        Self {
            x: params.iter().map(Parameter::value).collect(),
            prev_x: None,
            prev_grad: None,
            history: History::new(m),
            bounds: params.iter().map(Parameter::bounds).collect(),
            n_fev: 0,
            n_gev: 0,
        }
    }

    /// Record the curvature pair between the previous and the current point.
    fn update_history(&mut self, grad: &[f64]) {
        if let (Some(prev_x), Some(prev_g)) = (self.prev_x.take(), self.prev_grad.take()) {
            let s = self.x.iter().zip(&prev_x).map(|(a, b)| a - b).collect();
            let y = grad.iter().zip(&prev_g).map(|(a, b)| a - b).collect();
            self.history.record(s, y);
        }
    }

    /// Quasi-Newton direction `-H⁻¹ g`.
    fn lbfgs_direction(&self, grad: &[f64]) -> Vec<f64> {
        self.history.apply_inverse(grad).into_iter().map(|v| -v).collect()
    }

    /// Descent direction with components pushing out of an active bound removed.
    fn direction(&self, grad: &[f64]) -> Vec<f64> {
        let mut d = self.lbfgs_direction(grad);
        if !(dot(grad, &d) < 0.0) {
            d = grad.iter().map(|&g| -g).collect();
        }
        for (i, di) in d.iter_mut().enumerate() {
            let (lo, hi) = self.bounds[i];
            if (self.x[i] <= lo && *di < 0.0) || (self.x[i] >= hi && *di > 0.0) {
                *di = 0.0;
            }
        }
        d
    }

    /// Gradient norm ignoring components blocked by an active bound.
    fn projected_gradient_norm(&self, grad: &[f64]) -> f64 {
        grad.iter()
            .enumerate()
            .map(|(i, &g)| {
                let (lo, hi) = self.bounds[i];
                if (self.x[i] <= lo && g > 0.0) || (self.x[i] >= hi && g < 0.0) { 0.0 } else { g }
            })
            .map(|g| g * g)
            .sum::<f64>()
            .sqrt()
    }

    fn propose_x(&self, direction: &[f64], step: f64) -> Vec<f64> {
        self.x
            .iter()
            .zip(direction)
            .zip(&self.bounds)
            .map(|((&x, &d), &(lo, hi))| (x + step * d).clamp(lo, hi))
            .collect()
    }

    /// EDM = gᵀ H⁻¹ g from the curvature history; `None` without history.
    fn compute_edm(&self, grad: &[f64]) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let neg_h_inv_g = self.lbfgs_direction(grad);
        Some((-dot(grad, &neg_h_inv_g)).max(0.0))
    }
}

/// Quasi-Newton minimizer driven by the generic step loop.
pub struct LbfgsStepMinimizer {
    config: StepConfig,
    memory: usize,
    state: Option<LbfgsState>,
    edm: Option<f64>,
    stall: Option<String>,
}

impl LbfgsStepMinimizer {
    /// Create a step minimizer keeping `memory` curvature pairs.
    pub fn new(config: StepConfig, memory: usize) -> Result<Self> {
        if memory == 0 {
            return Err(Error::Validation("L-BFGS memory must be > 0".to_string()));
        }
        config.validate()?;
        Ok(Self { config, memory, state: None, edm: None, stall: None })
    }

    /// Objective and gradient evaluations spent since the last step loop started.
    pub fn evaluations(&self) -> (usize, usize) {
        self.state.as_ref().map_or((0, 0), |st| (st.n_fev, st.n_gev))
    }

    fn write_params(params: &[Parameter], x: &[f64]) -> Result<()> {
        for (p, &v) in params.iter().zip(x) {
            p.set_value_clamped(v)?;
        }
        Ok(())
    }
}

impl Default for LbfgsStepMinimizer {
    fn default() -> Self {
        Self { config: StepConfig::default(), memory: 10, state: None, edm: None, stall: None }
    }
}

impl Minimizer for LbfgsStepMinimizer {
    fn name(&self) -> &str {
        "LbfgsStepMinimizer"
    }

    fn config(&self) -> &StepConfig {
        &self.config
    }

    fn begin_steps(&mut self, params: &[Parameter]) {
        self.state = Some(LbfgsState::new(params, self.memory));
        self.edm = None;
        self.stall = None;
    }

    fn step_edm(&self) -> Option<f64> {
        self.edm
    }

    fn step_failure(&self) -> Option<String> {
        self.stall.clone()
    }

    fn gradient_step(&mut self, loss: &dyn Loss, params: &[Parameter]) -> Result<f64> {
        self.stall = None;
        if self.state.as_ref().is_none_or(|st| st.x.len() != params.len()) {
            self.state = Some(LbfgsState::new(params, self.memory));
        }
        let memory = self.memory;
        let st = self.state.get_or_insert_with(|| LbfgsState::new(params, memory));
        // Parameters may have been moved between steps.
        st.x = params.iter().map(Parameter::value).collect();

        let f = loss.value()?;
        let grad = loss.gradient(params)?;
        st.n_fev += 1;
        st.n_gev += 1;
        if !f.is_finite() || grad.iter().any(|g| !g.is_finite()) {
            return Ok(f64::NAN);
        }

        st.update_history(&grad);
        if let Some(edm) = st.compute_edm(&grad) {
            self.edm = Some(edm);
        }
        if st.projected_gradient_norm(&grad) == 0.0 {
            return Ok(f);
        }

        let direction = st.direction(&grad);
        let mut step = 1.0;
        let mut predicted = 0.0;
        for i in 0..MAX_BACKTRACK {
            let x_next = st.propose_x(&direction, step);
            let decrease: f64 =
                grad.iter().zip(x_next.iter().zip(&st.x)).map(|(g, (a, b))| g * (a - b)).sum();
            if i == 0 {
                predicted = -decrease;
            }
            Self::write_params(params, &x_next)?;
            let f_next = loss.value()?;
            st.n_fev += 1;
            if f_next.is_finite() && f_next <= f + ARMIJO_C1 * decrease {
                st.prev_x = Some(std::mem::replace(&mut st.x, x_next));
                st.prev_grad = Some(grad);
                return Ok(f_next);
            }
            step *= 0.5;
        }

        Self::write_params(params, &st.x)?;
        // Below the tolerance the stall is rounding noise at the minimum.
        if predicted > self.config.tolerance {
            log::debug!("{}: line search found no decrease from {f}", loss.name());
            self.stall = Some(format!(
                "line search found no decrease from {f} although the gradient predicts {predicted:.3e}"
            ));
        }
        Ok(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minimizer::ParamSelection;
    use approx::assert_relative_eq;
    use mlfit_core::FitStatus;

    struct Rosenbrock {
        x: Parameter,
        y: Parameter,
    }

    impl Loss for Rosenbrock {
        fn name(&self) -> &str {
            "Rosenbrock"
        }

        fn value(&self) -> Result<f64> {
            let (x, y) = (self.x.value(), self.y.value());
            Ok((1.0 - x).powi(2) + 100.0 * (y - x * x).powi(2))
        }

        fn get_dependents(&self, _only_floating: bool) -> Vec<Parameter> {
            vec![self.x.clone(), self.y.clone()]
        }

        fn errordef(&self, sigma: f64) -> Result<f64> {
            Ok(0.5 * sigma * sigma)
        }

        fn gradient(&self, _params: &[Parameter]) -> Result<Vec<f64>> {
            let (x, y) = (self.x.value(), self.y.value());
            Ok(vec![-2.0 * (1.0 - x) - 400.0 * x * (y - x * x), 200.0 * (y - x * x)])
        }
    }

    struct Shifted {
        x: Parameter,
        y: Parameter,
    }

    impl Loss for Shifted {
        fn name(&self) -> &str {
            "Shifted"
        }

        fn value(&self) -> Result<f64> {
            Ok((self.x.value() - 2.0).powi(2) + (self.y.value() - 3.0).powi(2))
        }

        fn get_dependents(&self, _only_floating: bool) -> Vec<Parameter> {
            vec![self.x.clone(), self.y.clone()]
        }

        fn errordef(&self, sigma: f64) -> Result<f64> {
            Ok(0.5 * sigma * sigma)
        }
    }

    #[test]
    fn test_history_drops_oldest_pair() {
        let mut history = History::new(3);
        for i in 1..=5 {
            let v = i as f64;
            assert!(history.record(vec![v, v], vec![v + 10.0, v + 10.0]));
        }
        assert_eq!(history.pairs.len(), 3);
        assert_eq!(history.pairs[0].s, vec![3.0, 3.0]);
        assert_eq!(history.pairs[2].y, vec![15.0, 15.0]);
        assert_relative_eq!(history.pairs[0].rho, 1.0 / 78.0);
    }

    #[test]
    fn test_history_rejects_non_positive_curvature() {
        let mut history = History::new(1);
        assert!(!history.record(vec![1.0, 0.0], vec![-1.0, 0.0]));
        assert!(history.is_empty());
        assert_eq!(history.apply_inverse(&[2.0, -3.0]), vec![2.0, -3.0]);

        assert!(history.record(vec![1.0, 2.0], vec![2.0, 4.0]));
        assert!(history.record(vec![7.0, 8.0], vec![7.0, 8.0]));
        assert_eq!(history.pairs.len(), 1);
        assert_eq!(history.pairs[0].s, vec![7.0, 8.0]);
    }

    #[test]
    fn test_edm_needs_history() {
        let p = [Parameter::new("a", 5.0).unwrap(), Parameter::new("b", 3.0).unwrap()];
        let mut st = LbfgsState::new(&p, 5);
        assert!(st.compute_edm(&[0.1, -0.2]).is_none());

        // One pair with s = y: H0 = I and the update leaves it unchanged.
        assert!(st.history.record(vec![-4.0, -2.0], vec![-4.0, -2.0]));
        let edm = st.compute_edm(&[1.0, 1.0]).unwrap();
        assert_relative_eq!(edm, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_direction_respects_active_bound() {
        let p = [Parameter::bounded("a", 0.0, 0.0, 1.0).unwrap()];
        let st = LbfgsState::new(&p, 3);
        // Gradient > 0 pushes below the lower bound.
        assert_eq!(st.direction(&[2.0]), vec![0.0]);
        assert_eq!(st.projected_gradient_norm(&[2.0]), 0.0);
    }

    #[test]
    fn test_quadratic_converges() {
        let loss = Shifted {
            x: Parameter::new("x", 0.0).unwrap(),
            y: Parameter::new("y", 0.0).unwrap(),
        };
        let mut minimizer = LbfgsStepMinimizer::default();
        let result = minimizer.minimize(&loss, ParamSelection::AllFloating).unwrap();

        assert!(result.converged(), "{:?}", result.status());
        assert_relative_eq!(result.value_by_name("x").unwrap(), 2.0, epsilon = 1e-3);
        assert_relative_eq!(result.value_by_name("y").unwrap(), 3.0, epsilon = 1e-3);
        assert!(result.fmin() < 1e-6);
        assert_eq!(result.info()["strategy"], "gradient_step");
    }

    #[test]
    fn test_bounded_optimum() {
        let loss = Shifted {
            x: Parameter::bounded("x", 4.0, 3.0, 5.0).unwrap(),
            y: Parameter::bounded("y", 1.5, 1.0, 2.0).unwrap(),
        };
        let mut minimizer = LbfgsStepMinimizer::default();
        let result = minimizer.minimize(&loss, ParamSelection::AllFloating).unwrap();

        assert!(result.converged());
        assert_relative_eq!(result.value_by_name("x").unwrap(), 3.0, epsilon = 1e-6);
        assert_relative_eq!(result.value_by_name("y").unwrap(), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rosenbrock() {
        let loss = Rosenbrock {
            x: Parameter::new("x", -1.2).unwrap(),
            y: Parameter::new("y", 1.0).unwrap(),
        };
        let config = StepConfig { tolerance: 1e-12, max_iterations: 5_000 };
        let mut minimizer = LbfgsStepMinimizer::new(config, 10).unwrap();
        let result = minimizer.minimize(&loss, ParamSelection::AllFloating).unwrap();

        assert!(result.converged(), "{:?}", result.status());
        assert_relative_eq!(result.value_by_name("x").unwrap(), 1.0, epsilon = 1e-3);
        assert_relative_eq!(result.value_by_name("y").unwrap(), 1.0, epsilon = 2e-3);
        assert!(result.edm().is_some());
    }

    #[test]
    fn test_failed_line_search_is_not_convergence() {
        /// (x - 2)² with a gradient of the wrong sign.
        struct Misleading(Parameter);
        impl Loss for Misleading {
            fn name(&self) -> &str {
                "Misleading"
            }
            fn value(&self) -> Result<f64> {
                Ok((self.0.value() - 2.0).powi(2))
            }
            fn get_dependents(&self, _only_floating: bool) -> Vec<Parameter> {
                vec![self.0.clone()]
            }
            fn errordef(&self, sigma: f64) -> Result<f64> {
                Ok(0.5 * sigma * sigma)
            }
            fn gradient(&self, _params: &[Parameter]) -> Result<Vec<f64>> {
                Ok(vec![-2.0 * (self.0.value() - 2.0)])
            }
        }

        let loss = Misleading(Parameter::new("x", 0.0).unwrap());
        let mut minimizer = LbfgsStepMinimizer::default();
        let result = minimizer.minimize(&loss, ParamSelection::AllFloating).unwrap();

        assert!(!result.converged());
        match result.status() {
            FitStatus::Failed { reason } => assert!(reason.contains("line search"), "{reason}"),
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(result.info()["n_iter"], 1);
        assert_eq!(loss.0.value(), 0.0);
        assert_relative_eq!(result.fmin(), 4.0);
    }

    #[test]
    fn test_zero_memory_rejected() {
        assert!(LbfgsStepMinimizer::new(StepConfig::default(), 0).is_err());
    }
}
