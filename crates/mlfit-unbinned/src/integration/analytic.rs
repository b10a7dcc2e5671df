//! Registry of closed-form integrals.
//!
//! Integrals are indexed first by the (sorted) set of axes they integrate over, then by their
//! exact limits. Lookup picks the largest registered axis set covered by the request, then the
//! highest-priority integral on that set whose limits contain the requested region.

use mlfit_core::{Error, Result, Space};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Priority used when the caller has no preference.
pub const DEFAULT_PRIORITY: i32 = 50;

/// Arguments passed to a registered integral.
#[derive(Debug, Clone, Copy)]
pub struct IntegralArgs<'a> {
    /// Points at which a partial integral is evaluated (`[column][point]`), `None` for a full
    /// integral.
    pub x: Option<&'a [Vec<f64>]>,
    /// Integration limits over the integral's axes (sorted ascending).
    pub limits: &'a Space,
    /// Normalization range, if the caller wants a normalized integral.
    pub norm_range: Option<&'a Space>,
    /// Current parameter values by name.
    pub params: Option<&'a BTreeMap<String, f64>>,
}

/// Closed-form integral evaluator. Returns one value for a full integral, one per point of
/// `x` otherwise.
pub type IntegralFn = Arc<dyn Fn(&IntegralArgs<'_>) -> Result<Vec<f64>> + Send + Sync>;

/// What a registered integral can be called with beyond a single box of limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegralCapabilities {
    /// Accepts a normalization range.
    pub norm_range: bool,
    /// Accepts limits made of several boxes.
    pub multiple_limits: bool,
}

impl IntegralCapabilities {
    /// Capabilities of an integral that supports everything.
    pub fn all() -> Self {
        Self { norm_range: true, multiple_limits: true }
    }
}

/// An integral together with its validity region, priority and capabilities.
#[derive(Clone)]
pub struct RegisteredIntegral {
    func: IntegralFn,
    space: Space,
    priority: i32,
    capabilities: IntegralCapabilities,
}

impl RegisteredIntegral {
    /// Region (axes sorted ascending) in which the integral is valid.
    pub fn space(&self) -> &Space {
        &self.space
    }

    /// Selection priority in `0..=100`.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Declared capabilities.
    pub fn capabilities(&self) -> IntegralCapabilities {
        self.capabilities
    }

    /// Evaluate the integral, refusing calls outside its declared capabilities.
    pub fn call(&self, args: &IntegralArgs<'_>) -> Result<Vec<f64>> {
        if args.norm_range.is_some() && !self.capabilities.norm_range {
            return Err(Error::NormRangeNotSupported(format!(
                "integral over {} cannot be called with a norm range",
                self.space
            )));
        }
        if args.limits.n_limits() > 1 && !self.capabilities.multiple_limits {
            return Err(Error::MultipleLimitsNotSupported(format!(
                "integral over {} cannot be called with {} limit boxes",
                self.space,
                args.limits.n_limits()
            )));
        }
        (self.func)(args)
    }
}

impl fmt::Debug for RegisteredIntegral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredIntegral")
            .field("space", &self.space)
            .field("priority", &self.priority)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Axis-indexed catalogue of analytic integrals.
#[derive(Debug, Clone, Default)]
pub struct AnalyticIntegral {
    /// Sorted axis set -> entries in registration order.
    integrals: BTreeMap<Vec<usize>, Vec<RegisteredIntegral>>,
}

impl AnalyticIntegral {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered integrals.
    pub fn len(&self) -> usize {
        self.integrals.values().map(Vec::len).sum()
    }

    /// `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.integrals.is_empty()
    }

    /// Register `func` as the integral over `space`.
    ///
    /// `space` must carry limits and `priority` must lie in `0..=100`. Entries over identical
    /// limits are kept side by side; lookup decides between them by priority.
    pub fn register(
        &mut self,
        func: IntegralFn,
        space: &Space,
        priority: i32,
        capabilities: IntegralCapabilities,
    ) -> Result<()> {
        if !space.has_limits() {
            return Err(Error::InvalidSpace(format!(
                "an analytic integral needs a space with limits, got {space}"
            )));
        }
        if !(0..=100).contains(&priority) {
            return Err(Error::Validation(format!(
                "integral priority must be in 0..=100, got {priority}"
            )));
        }
        let space = space.sorted();
        let entry = RegisteredIntegral { func, space, priority, capabilities };
        self.integrals.entry(entry.space.axes().to_vec()).or_default().push(entry);
        Ok(())
    }

    /// Largest registered axis set that is a subset of `space`'s axes and has an integral whose
    /// limits contain `space`. Ties in size go to the lexicographically smallest set. Empty if
    /// nothing matches.
    pub fn get_max_axes(&self, space: &Space) -> Vec<usize> {
        let mut best: Option<&Vec<usize>> = None;
        for (axes, entries) in &self.integrals {
            if !axes.iter().all(|a| space.axis_position(*a).is_some()) {
                continue;
            }
            if !entries.iter().any(|integral| integral.space.contains(space)) {
                continue;
            }
            if best.is_none_or(|b| axes.len() > b.len()) {
                best = Some(axes);
            }
        }
        best.cloned().unwrap_or_default()
    }

    /// Highest-priority integral whose limits contain `space`, on the axis set `axes` or, if
    /// `None`, on [`AnalyticIntegral::get_max_axes`]. The first registered wins ties.
    pub fn get_max_integral(
        &self,
        space: &Space,
        axes: Option<&[usize]>,
    ) -> Option<&RegisteredIntegral> {
        let axes = match axes {
            Some(axes) => sorted(axes),
            None => self.get_max_axes(space),
        };
        self.best_on(&axes, space)
    }

    /// Integrate over `axes` (default: all axes of `space`) within the limits of `space`.
    ///
    /// With `x = None` the result is the full integral (one value); otherwise a partial
    /// integral evaluated at each point of `x`. Fails with [`Error::NoIntegralForAxes`] if no
    /// integral was ever registered on these axes and with [`Error::NoIntegralForLimits`] if
    /// none of those covers `space`.
    pub fn integrate(
        &self,
        x: Option<&[Vec<f64>]>,
        space: &Space,
        axes: Option<&[usize]>,
        norm_range: Option<&Space>,
        params: Option<&BTreeMap<String, f64>>,
    ) -> Result<Vec<f64>> {
        let axes = sorted(axes.unwrap_or(space.axes()));
        if !self.integrals.contains_key(&axes) {
            return Err(Error::NoIntegralForAxes { axes });
        }
        let limits = space.subspace(&axes)?;
        let Some(integral) = self.best_on(&axes, space) else {
            return Err(Error::NoIntegralForLimits { axes, limits: limits.to_string() });
        };

        let values = integral.call(&IntegralArgs { x, limits: &limits, norm_range, params })?;
        let expected = x.map_or(1, |cols| cols.first().map_or(0, Vec::len));
        if values.len() != expected {
            return Err(Error::Computation(format!(
                "analytic integral over {limits} returned {} values, expected {expected}",
                values.len()
            )));
        }
        Ok(values)
    }

    fn best_on(&self, axes: &[usize], space: &Space) -> Option<&RegisteredIntegral> {
        let mut best: Option<&RegisteredIntegral> = None;
        for integral in self.integrals.get(axes)? {
            if !integral.space.contains(space) {
                continue;
            }
            if best.is_none_or(|b| integral.priority > b.priority) {
                best = Some(integral);
            }
        }
        best
    }
}

fn sorted(axes: &[usize]) -> Vec<usize> {
    let mut axes = axes.to_vec();
    axes.sort_unstable();
    axes
}
