//! # mlfit-inference
//!
//! Minimization for mlfit.
//!
//! This crate provides:
//! - The [`Minimizer`] protocol with a full-minimization strategy, a step-wise fallback and
//!   the generic step loop ([`minimize_with_steps`]) with its sliding-window convergence test.
//! - [`LbfgsStepMinimizer`]: a native L-BFGS gradient step driven by the step loop.
//! - [`LbfgsMinimizer`]: full minimization through argmin's L-BFGS.
//! - [`hesse`]: covariance and uncertainties from the numerical Hessian.
//!
//! ## Architecture
//!
//! Minimizers only see the [`mlfit_core::Loss`] trait; they never depend on how the loss
//! is built.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Hessian-based uncertainties.
pub mod hesse;
/// L-BFGS gradient-step minimizer.
pub mod lbfgs;
/// Minimizer protocol and step loop.
pub mod minimizer;
/// argmin-backed full minimizer.
pub mod optimizer;

pub use hesse::hesse;
pub use lbfgs::LbfgsStepMinimizer;
pub use minimizer::{
    CHANGE_WINDOW, Minimizer, N_LARGEST_CHANGES, ParamSelection, StepConfig, Strategy,
    minimize_with_steps,
};
pub use optimizer::LbfgsMinimizer;
