//! Minimizer protocol and the generic step loop.
//!
//! A concrete minimizer implements any subset of three strategies:
//! - [`Minimizer::minimize_full`]: one all-at-once minimization;
//! - [`Minimizer::gradient_step`]: a single native gradient / quasi-Newton update;
//! - [`Minimizer::step`]: a single generic update.
//!
//! [`Minimizer::minimize`] tries the full strategy first and falls back to the step loop
//! when it reports [`Error::NotImplemented`]. The step loop keeps a sliding window of the
//! last [`CHANGE_WINDOW`] absolute objective changes and stops once the sum of the
//! [`N_LARGEST_CHANGES`] largest is at or below the tolerance.

use std::collections::VecDeque;

use mlfit_core::{Error, FitResult, FitStatus, Loss, Parameter, Result};
use serde::{Deserialize, Serialize};

/// Number of consecutive objective changes remembered by the step loop.
pub const CHANGE_WINDOW: usize = 10;
/// Number of largest remembered changes summed for the convergence test.
pub const N_LARGEST_CHANGES: usize = 3;
/// Objective value the first change is measured against.
const INITIAL_LAST_VALUE: f64 = -10.0;

/// Configuration of the generic step loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Convergence tolerance on the sum of the largest recent objective changes.
    pub tolerance: f64,
    /// Maximum number of steps before the minimization is declared failed.
    pub max_iterations: u64,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self { tolerance: 1e-6, max_iterations: 10_000 }
    }
}

impl StepConfig {
    /// Fail fast on a negative/non-finite tolerance or a zero iteration budget.
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(Error::Validation(format!(
                "tolerance must be finite and >= 0, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::Validation("max_iterations must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Parameters a minimization acts on.
#[derive(Debug, Clone, Default)]
pub enum ParamSelection {
    /// Every floating dependent of the loss.
    #[default]
    AllFloating,
    /// An explicit, ordered parameter list.
    Params(Vec<Parameter>),
    /// Parameter names, resolved against the loss dependents.
    Names(Vec<String>),
}

impl ParamSelection {
    /// Resolve the selection into an ordered parameter list for `loss`.
    pub fn resolve(&self, loss: &dyn Loss) -> Result<Vec<Parameter>> {
        let params = match self {
            ParamSelection::AllFloating => loss.get_dependents(true),
            ParamSelection::Params(params) => {
                let mut out = Vec::with_capacity(params.len());
                mlfit_core::parameter::extend_unique(&mut out, params.iter().cloned());
                out
            }
            ParamSelection::Names(names) => {
                let dependents = loss.get_dependents(false);
                let mut out = Vec::with_capacity(names.len());
                for name in names {
                    let param = dependents.iter().find(|p| p.name() == name).ok_or_else(|| {
                        Error::Validation(format!(
                            "loss '{}' has no parameter named '{name}'",
                            loss.name()
                        ))
                    })?;
                    mlfit_core::parameter::extend_unique(&mut out, [param.clone()]);
                }
                out
            }
        };
        if params.is_empty() {
            return Err(Error::Validation(format!(
                "no parameters to minimize loss '{}' over",
                loss.name()
            )));
        }
        Ok(params)
    }
}

impl From<Parameter> for ParamSelection {
    fn from(param: Parameter) -> Self {
        ParamSelection::Params(vec![param])
    }
}

impl From<Vec<Parameter>> for ParamSelection {
    fn from(params: Vec<Parameter>) -> Self {
        ParamSelection::Params(params)
    }
}

impl From<&[Parameter]> for ParamSelection {
    fn from(params: &[Parameter]) -> Self {
        ParamSelection::Params(params.to_vec())
    }
}

impl From<&str> for ParamSelection {
    fn from(name: &str) -> Self {
        ParamSelection::Names(vec![name.to_string()])
    }
}

impl From<Vec<String>> for ParamSelection {
    fn from(names: Vec<String>) -> Self {
        ParamSelection::Names(names)
    }
}

impl From<Vec<&str>> for ParamSelection {
    fn from(names: Vec<&str>) -> Self {
        ParamSelection::Names(names.into_iter().map(str::to_string).collect())
    }
}

/// Which strategy produced a fit result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// [`Minimizer::minimize_full`].
    Full,
    /// Step loop driven by [`Minimizer::gradient_step`].
    GradientStep,
    /// Step loop driven by [`Minimizer::step`].
    Step,
}

impl Strategy {
    /// Name recorded in the fit result `info`.
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Full => "full",
            Strategy::GradientStep => "gradient_step",
            Strategy::Step => "step",
        }
    }
}

/// A minimization backend.
///
/// Implement at least one of [`minimize_full`](Self::minimize_full),
/// [`gradient_step`](Self::gradient_step) or [`step`](Self::step); the others keep their
/// `NotImplemented` defaults.
pub trait Minimizer {
    /// Minimizer name (recorded in fit results).
    fn name(&self) -> &str;

    /// Step-loop configuration.
    fn config(&self) -> &StepConfig;

    /// Convergence tolerance.
    fn tolerance(&self) -> f64 {
        self.config().tolerance
    }

    /// Minimize `loss` over `params` in one call.
    fn minimize_full(&mut self, loss: &dyn Loss, params: &[Parameter]) -> Result<FitResult> {
        let _ = (loss, params);
        Err(Error::NotImplemented(format!("{}: full minimization", self.name())))
    }

    /// Perform one native gradient update of `params` and return the new objective value.
    fn gradient_step(&mut self, loss: &dyn Loss, params: &[Parameter]) -> Result<f64> {
        let _ = (loss, params);
        Err(Error::NotImplemented(format!("{}: gradient step", self.name())))
    }

    /// Perform one generic update of `params` and return the new objective value.
    fn step(&mut self, loss: &dyn Loss, params: &[Parameter]) -> Result<f64> {
        let _ = (loss, params);
        Err(Error::NotImplemented(format!("{}: step", self.name())))
    }

    /// Called once before a step loop starts; stateful minimizers reset here.
    fn begin_steps(&mut self, params: &[Parameter]) {
        let _ = params;
    }

    /// Estimated distance to minimum after the last step, if the backend tracks one.
    fn step_edm(&self) -> Option<f64> {
        None
    }

    /// Why the last step made no progress although the minimum was not reached.
    ///
    /// A `Some` ends the step loop in [`FitStatus::Failed`].
    fn step_failure(&self) -> Option<String> {
        None
    }

    /// Minimize `loss` with respect to `selection`.
    ///
    /// Tries [`minimize_full`](Self::minimize_full) first, then the step loop. If neither is
    /// implemented, the error of the full strategy is returned.
    fn minimize(&mut self, loss: &dyn Loss, selection: ParamSelection) -> Result<FitResult>
    where
        Self: Sized,
    {
        self.config().validate()?;
        let params = selection.resolve(loss)?;
        match self.minimize_full(loss, &params) {
            Err(full_err) if full_err.is_not_implemented() => {
                log::debug!("{}: {full_err}; using the step loop", self.name());
                match minimize_with_steps(self, loss, &params) {
                    Err(step_err) if step_err.is_not_implemented() => Err(full_err),
                    other => other,
                }
            }
            other => other,
        }
    }
}

/// Run the generic step loop of `minimizer` over `params`.
///
/// Starts with [`Minimizer::gradient_step`] and switches permanently to
/// [`Minimizer::step`] once the former reports `NotImplemented`. At least one step is taken.
/// Ends in [`FitStatus::Failed`] after `max_iterations` steps, on a non-finite objective or
/// when the minimizer reports a [`Minimizer::step_failure`].
pub fn minimize_with_steps<M: Minimizer + ?Sized>(
    minimizer: &mut M,
    loss: &dyn Loss,
    params: &[Parameter],
) -> Result<FitResult> {
    let tolerance = minimizer.tolerance();
    let max_iterations = minimizer.config().max_iterations;

    let mut changes: VecDeque<f64> = std::iter::repeat_n(1.0, CHANGE_WINDOW).collect();
    let mut last_val = INITIAL_LAST_VALUE;
    let mut strategy = Strategy::GradientStep;
    let mut n_iter: u64 = 0;
    let mut failure: Option<String> = None;

    minimizer.begin_steps(params);
    loop {
        if n_iter >= max_iterations {
            failure = Some(format!("maximum number of iterations ({max_iterations}) reached"));
            break;
        }

        let cur_val = match strategy {
            Strategy::GradientStep => match minimizer.gradient_step(loss, params) {
                Err(e) if e.is_not_implemented() => {
                    log::debug!("{}: {e}; switching to step()", minimizer.name());
                    strategy = Strategy::Step;
                    minimizer.step(loss, params)?
                }
                other => other?,
            },
            _ => minimizer.step(loss, params)?,
        };
        n_iter += 1;

        if !cur_val.is_finite() {
            last_val = cur_val;
            failure = Some(format!("non-finite objective value {cur_val} at step {n_iter}"));
            break;
        }
        if let Some(reason) = minimizer.step_failure() {
            last_val = cur_val;
            failure = Some(reason);
            break;
        }

        changes.pop_front();
        changes.push_back((cur_val - last_val).abs());
        last_val = cur_val;
        if largest_changes_sum(&changes) <= tolerance {
            break;
        }
    }

    let status = match failure {
        Some(reason) => {
            log::warn!("{} failed on loss '{}': {reason}", minimizer.name(), loss.name());
            FitStatus::Failed { reason }
        }
        None => FitStatus::Converged,
    };

    let values = params.iter().map(|p| (p.clone(), p.value())).collect();
    let mut result = FitResult::new(values, last_val, status, loss.name(), minimizer.name())
        .with_info("n_iter", n_iter)
        .with_info("strategy", strategy.as_str());
    if let Some(edm) = minimizer.step_edm() {
        result = result.with_edm(edm);
    }
    Ok(result)
}

fn largest_changes_sum(changes: &VecDeque<f64>) -> f64 {
    let mut sorted: Vec<f64> = changes.iter().copied().collect();
    sorted.sort_by(|a, b| b.total_cmp(a));
    sorted.iter().take(N_LARGEST_CHANGES).sum()
}
