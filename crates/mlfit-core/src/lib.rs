//! # mlfit-core
//!
//! Core types and traits shared by the mlfit crates:
//! - [`Error`] / [`Result`]: the error taxonomy used across the workspace.
//! - [`Space`]: axis-indexed regions with limit boxes.
//! - [`Parameter`]: shared, versioned parameter handles.
//! - [`FitResult`]: immutable minimization results.
//! - [`traits::Loss`]: the objective seam between likelihood construction and minimizers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod parameter;
pub mod space;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use parameter::Parameter;
pub use space::Space;
pub use traits::Loss;
pub use types::{FitResult, FitStatus, FitSummary};
