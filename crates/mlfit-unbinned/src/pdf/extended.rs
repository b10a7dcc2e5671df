//! Yield-carrying wrapper for extended likelihoods.

use crate::context::RunContext;
use crate::integration::AnalyticIntegral;
use crate::pdf::{Pdf, PdfRef};
use mlfit_core::{Parameter, Result, Space};

/// Extended version of another PDF: same shape, scaled by a yield parameter.
#[derive(Clone)]
pub struct ExtendedPdf {
    name: String,
    inner: PdfRef,
    yield_: Parameter,
}

impl ExtendedPdf {
    /// Attach `yield_` to `inner`.
    pub fn new(inner: PdfRef, yield_: Parameter) -> Self {
        let name = format!("Extended{}", inner.name());
        Self { name, inner, yield_ }
    }

    /// The wrapped shape.
    pub fn inner(&self) -> &PdfRef {
        &self.inner
    }
}

impl std::fmt::Debug for ExtendedPdf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedPdf")
            .field("name", &self.name)
            .field("yield", &self.yield_)
            .finish_non_exhaustive()
    }
}

impl Pdf for ExtendedPdf {
    fn name(&self) -> &str {
        &self.name
    }

    fn space(&self) -> &Space {
        self.inner.space()
    }

    fn norm_range(&self) -> &Space {
        self.inner.norm_range()
    }

    fn params(&self) -> Vec<Parameter> {
        let mut params = self.inner.params();
        mlfit_core::parameter::extend_unique(&mut params, [self.yield_.clone()]);
        params
    }

    fn unnormalized_pdf(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        self.inner.unnormalized_pdf(x)
    }

    fn analytic_integrals(&self) -> Option<&AnalyticIntegral> {
        self.inner.analytic_integrals()
    }

    fn is_extended(&self) -> bool {
        true
    }

    fn get_yield(&self) -> Option<&Parameter> {
        Some(&self.yield_)
    }

    fn normalization(&self, norm_range: &Space, ctx: &RunContext) -> Result<f64> {
        self.inner.normalization(norm_range, ctx)
    }
}
