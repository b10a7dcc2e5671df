//! Probability density functions consumed by the unbinned losses.

use crate::context::RunContext;
use crate::data::Dataset;
use crate::integration::{AnalyticIntegral, integrate_pdf};
use mlfit_core::{Error, Parameter, Result, Space};
use std::collections::BTreeMap;
use std::sync::Arc;

mod exponential;
mod extended;
mod function;
mod gaussian;

pub use exponential::ExponentialPdf;
pub use extended::ExtendedPdf;
pub use function::{FunctionPdf, ShapeFn};
pub use gaussian::GaussianPdf;

/// Shared handle to a PDF.
pub type PdfRef = Arc<dyn Pdf>;

/// Density model over the axes of [`Pdf::space`].
///
/// Implementors provide the unnormalized shape; normalization over a range is computed from the
/// PDF's analytic integrals when one applies and by Monte Carlo integration otherwise.
pub trait Pdf: Send + Sync {
    /// Model name.
    fn name(&self) -> &str;

    /// Axes the model is defined over, in the model's column order.
    fn space(&self) -> &Space;

    /// Default normalization range.
    fn norm_range(&self) -> &Space;

    /// Parameters the model depends on (including the yield of an extended model).
    fn params(&self) -> Vec<Parameter>;

    /// Unnormalized density at the points `x` (`[column][point]`, one column per axis of
    /// [`Pdf::space`]).
    fn unnormalized_pdf(&self, x: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Closed-form integrals of the unnormalized density, if any.
    fn analytic_integrals(&self) -> Option<&AnalyticIntegral> {
        None
    }

    /// Whether the model carries a yield.
    fn is_extended(&self) -> bool {
        false
    }

    /// Yield parameter of an extended model.
    fn get_yield(&self) -> Option<&Parameter> {
        None
    }

    /// Current parameter values keyed by name.
    fn param_values(&self) -> BTreeMap<String, f64> {
        self.params().iter().map(|p| (p.name().to_string(), p.value())).collect()
    }

    /// Integral of the unnormalized density over `norm_range`.
    fn normalization(&self, norm_range: &Space, ctx: &RunContext) -> Result<f64> {
        integrate_pdf(self, norm_range, ctx)
    }

    /// Normalized density of the events in `data` over `norm_range` (default:
    /// [`Pdf::norm_range`]). Extended models are scaled by their yield.
    fn pdf(&self, data: &Dataset, norm_range: Option<&Space>, ctx: &RunContext) -> Result<Vec<f64>> {
        let norm_range = match norm_range {
            Some(range) => self.convert_sort_space(range)?,
            None => self.norm_range().clone(),
        };
        let x = data.columns_for(self.space().axes())?;
        let mut values = self.unnormalized_pdf(&x)?;
        let norm = self.normalization(&norm_range, ctx)?;
        if !norm.is_finite() || norm <= 0.0 {
            return Err(Error::Computation(format!(
                "{}: normalization over {norm_range} is {norm}",
                self.name()
            )));
        }
        let scale = match self.get_yield().filter(|_| self.is_extended()) {
            Some(y) => y.value() / norm,
            None => 1.0 / norm,
        };
        for v in values.iter_mut() {
            *v *= scale;
        }
        Ok(values)
    }

    /// Reorder `space` to the model's axes; fails if the axis sets differ.
    fn convert_sort_space(&self, space: &Space) -> Result<Space> {
        space.with_axes(self.space().axes()).map_err(|_| {
            Error::InvalidSpace(format!(
                "{}: {space} does not cover exactly the axes {:?}",
                self.name(),
                self.space().axes()
            ))
        })
    }
}

/// Value of parameter `name` from an integral's argument map.
pub(crate) fn param_value(params: Option<&BTreeMap<String, f64>>, name: &str) -> Result<f64> {
    params
        .and_then(|p| p.get(name))
        .copied()
        .ok_or_else(|| Error::Validation(format!("missing value for parameter '{name}'")))
}

/// Check that `space` is one-dimensional with limits and return its axis.
pub(crate) fn single_axis(space: &Space, who: &str) -> Result<usize> {
    if space.n_axes() != 1 || !space.has_limits() {
        return Err(Error::InvalidSpace(format!(
            "{who} needs a one-dimensional space with limits, got {space}"
        )));
    }
    Ok(space.axes()[0])
}
