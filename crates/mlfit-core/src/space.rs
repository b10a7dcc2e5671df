//! Axis-indexed regions with (possibly multiple) rectangular limit boxes.
//!
//! A [`Space`] is the region a model is normalized over, a dataset is defined in, or an
//! integral is evaluated on. It is an immutable value: permutations and subsets produce new
//! spaces.

use crate::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
struct Limits {
    /// `lower[k][i]` is the lower bound of box `k` along axis slot `i`.
    lower: Vec<Vec<f64>>,
    upper: Vec<Vec<f64>>,
}

/// Ordered set of axes with zero or more limit boxes.
#[derive(Debug, Clone, PartialEq)]
pub struct Space {
    axes: Vec<usize>,
    limits: Option<Limits>,
}

impl Space {
    /// Create a space with a single limit box, one `(low, high)` pair per axis.
    pub fn new(axes: Vec<usize>, bounds: Vec<(f64, f64)>) -> Result<Self> {
        let (lower, upper): (Vec<f64>, Vec<f64>) = bounds.into_iter().unzip();
        Self::with_limits(axes, vec![lower], vec![upper])
    }

    /// One-dimensional interval `[low, high]` on `axis`.
    pub fn interval(axis: usize, low: f64, high: f64) -> Result<Self> {
        Self::new(vec![axis], vec![(low, high)])
    }

    /// Create a space with several limit boxes.
    ///
    /// `lower` and `upper` hold one row per box; each row has one entry per axis.
    pub fn with_limits(axes: Vec<usize>, lower: Vec<Vec<f64>>, upper: Vec<Vec<f64>>) -> Result<Self> {
        validate_axes(&axes)?;
        if lower.is_empty() || lower.len() != upper.len() {
            return Err(Error::InvalidSpace(format!(
                "expected the same non-zero number of lower and upper limit rows, got {} and {}",
                lower.len(),
                upper.len()
            )));
        }
        for (lo_row, hi_row) in lower.iter().zip(&upper) {
            if lo_row.len() != axes.len() || hi_row.len() != axes.len() {
                return Err(Error::InvalidSpace(format!(
                    "limit row length mismatch: {} axes, rows of length {} and {}",
                    axes.len(),
                    lo_row.len(),
                    hi_row.len()
                )));
            }
            for (&lo, &hi) in lo_row.iter().zip(hi_row) {
                if lo.is_nan() || hi.is_nan() || lo >= hi {
                    return Err(Error::InvalidSpace(format!(
                        "invalid limits: expected low < high, got ({lo}, {hi})"
                    )));
                }
            }
        }
        Ok(Self { axes, limits: Some(Limits { lower, upper }) })
    }

    /// A space that only names axes and carries no limits.
    pub fn axes_only(axes: Vec<usize>) -> Result<Self> {
        validate_axes(&axes)?;
        Ok(Self { axes, limits: None })
    }

    /// Axes in the order of this space.
    pub fn axes(&self) -> &[usize] {
        &self.axes
    }

    /// Number of axes.
    pub fn n_axes(&self) -> usize {
        self.axes.len()
    }

    /// Whether limits are attached.
    pub fn has_limits(&self) -> bool {
        self.limits.is_some()
    }

    /// Number of limit boxes (0 for an axes-only space).
    pub fn n_limits(&self) -> usize {
        self.limits.as_ref().map_or(0, |l| l.lower.len())
    }

    /// Lower and upper limit rows (`[box][axis]`).
    pub fn limits(&self) -> Result<(&[Vec<f64>], &[Vec<f64>])> {
        let limits = self.require_limits()?;
        Ok((&limits.lower, &limits.upper))
    }

    /// Iterate over the limit boxes as `(lower, upper)` rows.
    pub fn boxes(&self) -> impl Iterator<Item = (&[f64], &[f64])> + '_ {
        self.limits
            .iter()
            .flat_map(|l| l.lower.iter().zip(&l.upper))
            .map(|(lo, hi)| (lo.as_slice(), hi.as_slice()))
    }

    /// Total volume: sum over boxes of the product of the per-axis widths.
    pub fn area(&self) -> Result<f64> {
        self.require_limits()?;
        Ok(self.boxes().map(|(lo, hi)| lo.iter().zip(hi).map(|(a, b)| b - a).product::<f64>()).sum())
    }

    /// `true` if every bound is finite.
    pub fn is_bounded(&self) -> bool {
        self.has_limits() && self.boxes().all(|(lo, hi)| lo.iter().chain(hi).all(|v| v.is_finite()))
    }

    /// Slot of `axis` within this space.
    pub fn axis_position(&self, axis: usize) -> Option<usize> {
        self.axes.iter().position(|&a| a == axis)
    }

    /// Whether `other`, restricted to the axes of `self`, lies inside `self`.
    ///
    /// Every box of `other` must be enclosed by at least one box of `self`. Returns `false`
    /// if either space has no limits or `other` lacks one of `self`'s axes.
    pub fn contains(&self, other: &Space) -> bool {
        if !self.has_limits() || !other.has_limits() {
            return false;
        }
        let Some(slots) =
            self.axes.iter().map(|&a| other.axis_position(a)).collect::<Option<Vec<usize>>>()
        else {
            return false;
        };
        other.boxes().all(|(o_lo, o_hi)| {
            self.boxes().any(|(s_lo, s_hi)| {
                slots.iter().enumerate().all(|(i, &j)| s_lo[i] <= o_lo[j] && o_hi[j] <= s_hi[i])
            })
        })
    }

    /// Reorder the space to the given permutation of its axes.
    pub fn with_axes(&self, axes: &[usize]) -> Result<Space> {
        if axes.len() != self.axes.len() {
            return Err(Error::InvalidSpace(format!(
                "axes {axes:?} are not a permutation of {:?}",
                self.axes
            )));
        }
        self.subspace(axes)
    }

    /// Same space with axes sorted ascending.
    pub fn sorted(&self) -> Space {
        let mut axes = self.axes.clone();
        axes.sort_unstable();
        // Sorting is always a valid permutation.
        self.select(&axes)
    }

    /// Restrict the space to `axes` (in the given order).
    pub fn subspace(&self, axes: &[usize]) -> Result<Space> {
        validate_axes(axes)?;
        if let Some(missing) = axes.iter().find(|a| self.axis_position(**a).is_none()) {
            return Err(Error::InvalidSpace(format!(
                "axis {missing} is not part of the space with axes {:?}",
                self.axes
            )));
        }
        Ok(self.select(axes))
    }

    fn select(&self, axes: &[usize]) -> Space {
        let slots: Vec<usize> = axes.iter().filter_map(|&a| self.axis_position(a)).collect();
        let pick = |rows: &[Vec<f64>]| -> Vec<Vec<f64>> {
            rows.iter().map(|row| slots.iter().map(|&s| row[s]).collect()).collect()
        };
        let limits =
            self.limits.as_ref().map(|l| Limits { lower: pick(&l.lower), upper: pick(&l.upper) });
        Space { axes: axes.to_vec(), limits }
    }

    fn require_limits(&self) -> Result<&Limits> {
        self.limits
            .as_ref()
            .ok_or_else(|| Error::InvalidSpace(format!("space with axes {:?} has no limits", self.axes)))
    }
}

fn validate_axes(axes: &[usize]) -> Result<()> {
    if axes.is_empty() {
        return Err(Error::InvalidSpace("a space needs at least one axis".into()));
    }
    for (i, a) in axes.iter().enumerate() {
        if axes[..i].contains(a) {
            return Err(Error::InvalidSpace(format!("duplicate axis {a} in {axes:?}")));
        }
    }
    Ok(())
}

/// `Greater` means "strictly contains", `Less` "is strictly contained in".
impl PartialOrd for Space {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.contains(other), other.contains(self)) {
            (true, true) if self == other => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            _ => None,
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Space(axes={:?}", self.axes)?;
        if self.has_limits() {
            let boxes: Vec<String> = self
                .boxes()
                .map(|(lo, hi)| {
                    let pairs: Vec<String> =
                        lo.iter().zip(hi).map(|(a, b)| format!("({a}, {b})")).collect();
                    format!("[{}]", pairs.join(", "))
                })
                .collect();
            write!(f, ", limits={}", boxes.join(" | "))?;
        }
        write!(f, ")")
    }
}
