//! Monte Carlo integration over bounded boxes with memory-bounded batching.

use super::sampler::Sampler;
use crate::context::RunContext;
use mlfit_core::{Error, Result, Space};

/// Integrand evaluated on a batch of points given as columns (`[slot][point]`).
///
/// Must return one value per point.
pub type Integrand<'a> = dyn Fn(&[Vec<f64>]) -> Result<Vec<f64>> + 'a;

/// Uniform-sampling Monte Carlo integrator.
///
/// The estimate is `mean(f) * area` over `draws_per_dim ^ n_axes` points mapped from the
/// sampler's unit hypercube into the integration box. When the sample count exceeds
/// `chunk_size`, the points are evaluated in a fixed number of equal batches whose means are
/// folded with the streaming update `m <- m + (b - m) / i`.
pub struct McIntegrator<'s> {
    draws_per_dim: usize,
    chunk_size: usize,
    sampler: &'s dyn Sampler,
}

/// Sample layout of one integration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkPlan {
    n_chunks: usize,
    batch: usize,
}

impl ChunkPlan {
    fn new(n_samples: usize, chunk_size: usize) -> Self {
        if n_samples <= chunk_size {
            return Self { n_chunks: 1, batch: n_samples };
        }
        let n_chunks = n_samples.div_ceil(chunk_size);
        Self { n_chunks, batch: n_samples.div_ceil(n_chunks) }
    }

    fn n_drawn(&self) -> usize {
        self.n_chunks * self.batch
    }
}

impl<'s> McIntegrator<'s> {
    /// Create an integrator.
    pub fn new(draws_per_dim: usize, chunk_size: usize, sampler: &'s dyn Sampler) -> Result<Self> {
        if draws_per_dim == 0 {
            return Err(Error::Validation("Monte Carlo integration needs draws_per_dim > 0".into()));
        }
        if chunk_size == 0 {
            return Err(Error::Validation("Monte Carlo integration needs chunk_size > 0".into()));
        }
        Ok(Self { draws_per_dim, chunk_size, sampler })
    }

    /// Integrator using the sample budget of `ctx` and an externally owned sampler.
    pub fn from_context(ctx: &RunContext, sampler: &'s dyn Sampler) -> Result<Self> {
        Self::new(ctx.mc_draws_per_dim, ctx.chunk_size, sampler)
    }

    /// Integrate `func` over `space`.
    ///
    /// - `axes`: axes to integrate over (default: all axes of `space`).
    /// - `x = None`: full integral. `func` receives one column per integrated axis and the
    ///   result has a single element.
    /// - `x = Some(cols)`: partial integral. `cols` holds one column per axis of `space` that
    ///   is *not* integrated (in `space` order), all of the same length. For every point, `func`
    ///   receives one column per axis of `space` in `space` order, sampled on integrated axes
    ///   and broadcast from `x` on the others. The result has one element per point.
    pub fn integrate(
        &self,
        func: &Integrand<'_>,
        space: &Space,
        axes: Option<&[usize]>,
        x: Option<&[Vec<f64>]>,
    ) -> Result<Vec<f64>> {
        if !space.has_limits() {
            return Err(Error::InvalidSpace(format!("cannot integrate over {space}: no limits")));
        }
        if space.n_limits() > 1 {
            return Err(Error::InvalidSpace(format!(
                "Monte Carlo integration is defined over a single box, got {} in {space}",
                space.n_limits()
            )));
        }
        if !space.is_bounded() {
            return Err(Error::UnboundedLimits(format!(
                "Monte Carlo integration requires finite limits, got {space}"
            )));
        }

        let axes = axes.unwrap_or(space.axes());
        let int_space = space.subspace(axes)?;
        let n_samples = u32::try_from(axes.len())
            .ok()
            .and_then(|d| self.draws_per_dim.checked_pow(d))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "sample count {}^{} overflows",
                    self.draws_per_dim,
                    axes.len()
                ))
            })?;
        let plan = ChunkPlan::new(n_samples, self.chunk_size);
        log::debug!(
            "MC integration over {int_space}: {n_samples} samples in {} batch(es) of {}",
            plan.n_chunks,
            plan.batch
        );

        let area = int_space.area()?;
        let (lower, upper) = int_space.limits()?;
        let (lower, upper) = (&lower[0], &upper[0]);

        match x {
            None => {
                let mean = self.streaming_mean(plan, axes.len(), 0, |mut cols| {
                    to_box(&mut cols, lower, upper);
                    func(&cols)
                })?;
                Ok(vec![mean * area])
            }
            Some(x) => {
                let fixed_slots: Vec<usize> =
                    (0..space.n_axes()).filter(|&s| !axes.contains(&space.axes()[s])).collect();
                let n_points = validate_points(x, fixed_slots.len())?;
                let sampled_slots: Vec<usize> = axes
                    .iter()
                    .filter_map(|&a| space.axis_position(a))
                    .collect();

                let mut out = Vec::with_capacity(n_points);
                for point in 0..n_points {
                    let offset = point * plan.n_drawn();
                    let mean = self.streaming_mean(plan, axes.len(), offset, |mut cols| {
                        to_box(&mut cols, lower, upper);
                        let n = cols.first().map_or(0, Vec::len);
                        let mut slots: Vec<Vec<f64>> = vec![Vec::new(); space.n_axes()];
                        for (slot, col) in sampled_slots.iter().zip(cols) {
                            slots[*slot] = col;
                        }
                        for (slot, col) in fixed_slots.iter().zip(x) {
                            slots[*slot] = vec![col[point]; n];
                        }
                        func(&slots)
                    })?;
                    out.push(mean * area);
                }
                Ok(out)
            }
        }
    }

    /// Mean of `eval` over `plan.n_chunks` batches of `dim`-dimensional unit-cube samples,
    /// starting at `offset` in the sampler stream.
    fn streaming_mean<F>(&self, plan: ChunkPlan, dim: usize, offset: usize, eval: F) -> Result<f64>
    where
        F: Fn(Vec<Vec<f64>>) -> Result<Vec<f64>>,
    {
        let mut mean = 0.0;
        for i in 0..plan.n_chunks {
            let cols = self.sampler.sample(dim, plan.batch, offset + i * plan.batch)?;
            let values = eval(cols)?;
            if values.len() != plan.batch {
                return Err(Error::Computation(format!(
                    "integrand returned {} values for {} points",
                    values.len(),
                    plan.batch
                )));
            }
            let batch_mean = values.iter().sum::<f64>() / plan.batch as f64;
            mean += (batch_mean - mean) / (i + 1) as f64;
        }
        Ok(mean)
    }
}

/// Map unit-cube columns into `[lower, upper)` in place.
fn to_box(cols: &mut [Vec<f64>], lower: &[f64], upper: &[f64]) {
    for ((col, &lo), &hi) in cols.iter_mut().zip(lower).zip(upper) {
        let width = hi - lo;
        for u in col.iter_mut() {
            *u = lo + *u * width;
        }
    }
}

fn validate_points(x: &[Vec<f64>], n_fixed: usize) -> Result<usize> {
    if n_fixed == 0 {
        return Err(Error::Validation(
            "partial integration needs at least one axis that is not integrated".into(),
        ));
    }
    if x.len() != n_fixed {
        return Err(Error::Validation(format!(
            "partial integration expects {n_fixed} fixed column(s), got {}",
            x.len()
        )));
    }
    let n_points = x[0].len();
    if x.iter().any(|c| c.len() != n_points) {
        return Err(Error::Validation("fixed columns have different lengths".into()));
    }
    Ok(n_points)
}
