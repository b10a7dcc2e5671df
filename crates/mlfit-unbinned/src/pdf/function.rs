//! PDF built from a user-supplied shape closure.
//!
//! Integrals registered on the PDF take priority; everything else is normalized by the
//! Monte Carlo integrator of the run context.

use crate::integration::{AnalyticIntegral, IntegralCapabilities, IntegralFn};
use crate::pdf::Pdf;
use mlfit_core::{Error, Parameter, Result, Space};
use std::fmt;
use std::sync::Arc;

/// Unnormalized shape evaluated on columns (`[axis][point]`).
pub type ShapeFn = Arc<dyn Fn(&[Vec<f64>]) -> Result<Vec<f64>> + Send + Sync>;

/// PDF defined by a user closure.
///
/// Normalized by Monte Carlo integration unless closed-form integrals are registered with
/// [`FunctionPdf::register_integral`].
#[derive(Clone)]
pub struct FunctionPdf {
    name: String,
    space: Space,
    norm_range: Space,
    params: Vec<Parameter>,
    shape: ShapeFn,
    integrals: AnalyticIntegral,
}

impl FunctionPdf {
    /// Create a PDF over `space` (which also serves as the default normalization range).
    ///
    /// `params` lists every parameter the closure reads.
    pub fn new(
        name: impl Into<String>,
        space: Space,
        params: Vec<Parameter>,
        shape: ShapeFn,
    ) -> Result<Self> {
        if !space.has_limits() {
            return Err(Error::InvalidSpace(format!("a PDF needs a space with limits, got {space}")));
        }
        let mut unique = Vec::with_capacity(params.len());
        mlfit_core::parameter::extend_unique(&mut unique, params);
        Ok(Self {
            name: name.into(),
            norm_range: space.clone(),
            space,
            params: unique,
            shape,
            integrals: AnalyticIntegral::new(),
        })
    }

    /// Builder: use `norm_range` instead of the model space as default normalization range.
    pub fn with_norm_range(mut self, norm_range: Space) -> Result<Self> {
        self.norm_range = self.convert_sort_space(&norm_range)?;
        Ok(self)
    }

    /// Register a closed-form integral of the shape.
    pub fn register_integral(
        &mut self,
        func: IntegralFn,
        space: &Space,
        priority: i32,
        capabilities: IntegralCapabilities,
    ) -> Result<()> {
        self.integrals.register(func, space, priority, capabilities)
    }
}

impl fmt::Debug for FunctionPdf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionPdf")
            .field("name", &self.name)
            .field("space", &self.space)
            .field("params", &self.params)
            .field("integrals", &self.integrals)
            .finish_non_exhaustive()
    }
}

impl Pdf for FunctionPdf {
    fn name(&self) -> &str {
        &self.name
    }

    fn space(&self) -> &Space {
        &self.space
    }

    fn norm_range(&self) -> &Space {
        &self.norm_range
    }

    fn params(&self) -> Vec<Parameter> {
        self.params.clone()
    }

    fn unnormalized_pdf(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        if x.len() != self.space.n_axes() {
            return Err(Error::Validation(format!(
                "{} expects {} column(s), got {}",
                self.name,
                self.space.n_axes(),
                x.len()
            )));
        }
        (self.shape)(x)
    }

    fn analytic_integrals(&self) -> Option<&AnalyticIntegral> {
        (!self.integrals.is_empty()).then_some(&self.integrals)
    }
}
