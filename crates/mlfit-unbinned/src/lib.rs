//! # mlfit-unbinned
//!
//! Event-level (unbinned) likelihoods for mlfit.
//!
//! This crate provides:
//! - A columnar [`Dataset`] for observable vectors.
//! - The [`Pdf`] contract and reference PDFs (Gaussian, exponential, closure-defined, extended).
//! - An [`AnalyticIntegral`] registry of closed-form integrals and a chunked
//!   [`McIntegrator`] used to normalize PDFs.
//! - [`UnbinnedNll`] (plain and extended) and [`SimpleLoss`], implementing
//!   [`mlfit_core::Loss`], so they can be minimized via `mlfit-inference`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constraint;
pub mod context;
pub mod data;
pub mod integration;
pub mod loss;
pub mod pdf;

pub use constraint::{Constraint, Prior};
pub use context::{RunContext, SamplerKind};
pub use data::Dataset;
pub use integration::{
    AnalyticIntegral, DEFAULT_PRIORITY, HaltonSampler, IntegralArgs, IntegralCapabilities,
    IntegralFn, McIntegrator, RegisteredIntegral, Sampler, UniformSampler, integrate_pdf,
};
pub use loss::{NllKind, OneOrMany, SimpleLoss, UnbinnedNll};
pub use pdf::{ExponentialPdf, ExtendedPdf, FunctionPdf, GaussianPdf, Pdf, PdfRef, ShapeFn};
