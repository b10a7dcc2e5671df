//! Integration of model densities: analytic registry, Monte Carlo integrator and samplers.

mod analytic;
mod mc;
mod sampler;

pub use analytic::{
    AnalyticIntegral, DEFAULT_PRIORITY, IntegralArgs, IntegralCapabilities, IntegralFn,
    RegisteredIntegral,
};
pub use mc::{Integrand, McIntegrator};
pub use sampler::{HaltonSampler, Sampler, UniformSampler};

use crate::context::RunContext;
use crate::pdf::Pdf;
use mlfit_core::{Error, Result, Space};

/// Integral of `pdf`'s unnormalized density over `norm_range`.
///
/// A matching analytic integral is used when the PDF registered one. Only if none is registered
/// for the axes or limits does this fall back to Monte Carlo integration with the budget and
/// sampler of `ctx`; capability errors of a matching integral are returned as is.
pub fn integrate_pdf<P: Pdf + ?Sized>(pdf: &P, norm_range: &Space, ctx: &RunContext) -> Result<f64> {
    let norm_range = &pdf.convert_sort_space(norm_range)?;
    if let Some(registry) = pdf.analytic_integrals() {
        let params = pdf.param_values();
        match registry.integrate(None, norm_range, None, None, Some(&params)) {
            Ok(values) => return scalar(values),
            Err(e) if e.is_missing_integral() => {
                log::debug!("{}: {e}; falling back to Monte Carlo integration", pdf.name());
            }
            Err(e) => return Err(e),
        }
    }

    let sampler = ctx.sampler();
    let mc = McIntegrator::from_context(ctx, sampler.as_ref())?;
    let func = |x: &[Vec<f64>]| pdf.unnormalized_pdf(x);
    scalar(mc.integrate(&func, norm_range, None, None)?)
}

fn scalar(values: Vec<f64>) -> Result<f64> {
    match values.as_slice() {
        [v] => Ok(*v),
        _ => Err(Error::Computation(format!("expected a single integral value, got {}", values.len()))),
    }
}
