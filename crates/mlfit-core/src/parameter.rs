//! Shared, mutable model parameters.
//!
//! A [`Parameter`] is a cheap handle (`Arc`) to a named value. Models hold handles to the
//! parameters they depend on; losses and minimizers reference the same handles. Every value
//! change bumps a version stamp so dependants can tell whether a memoized result is stale.

use crate::{Error, Result};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug)]
struct ParameterInner {
    name: String,
    value_bits: AtomicU64,
    floating: AtomicBool,
    version: AtomicU64,
    lower: f64,
    upper: f64,
    step_size: Option<f64>,
}

/// A named floating-point parameter with optional bounds and a floating/fixed flag.
///
/// Equality and hashing follow handle identity, not value.
#[derive(Clone)]
pub struct Parameter {
    inner: Arc<ParameterInner>,
}

impl Parameter {
    /// Create an unbounded, floating parameter.
    pub fn new(name: impl Into<String>, value: f64) -> Result<Self> {
        Self::build(name.into(), value, f64::NEG_INFINITY, f64::INFINITY, None)
    }

    /// Create a floating parameter with bounds `[lower, upper]`.
    pub fn bounded(name: impl Into<String>, value: f64, lower: f64, upper: f64) -> Result<Self> {
        Self::build(name.into(), value, lower, upper, None)
    }

    /// Builder: attach a step size hint.
    ///
    /// Intended for construction time; the returned handle is a new parameter that does not
    /// share state with `self`.
    pub fn with_step_size(self, step_size: f64) -> Result<Self> {
        if !step_size.is_finite() || step_size <= 0.0 {
            return Err(Error::Validation(format!(
                "parameter '{}' step size must be finite and > 0, got {step_size}",
                self.name()
            )));
        }
        let (lower, upper) = self.bounds();
        let p = Self::build(self.name().to_string(), self.value(), lower, upper, Some(step_size))?;
        p.set_floating(self.is_floating());
        Ok(p)
    }

    fn build(
        name: String,
        value: f64,
        lower: f64,
        upper: f64,
        step_size: Option<f64>,
    ) -> Result<Self> {
        if lower.is_nan() || upper.is_nan() || lower > upper {
            return Err(Error::Validation(format!(
                "parameter '{name}' has invalid bounds ({lower}, {upper})"
            )));
        }
        if !value.is_finite() {
            return Err(Error::Validation(format!("parameter '{name}' value is not finite")));
        }
        if value < lower || value > upper {
            return Err(Error::Validation(format!(
                "parameter '{name}' value {value} outside bounds ({lower}, {upper})"
            )));
        }
        Ok(Self {
            inner: Arc::new(ParameterInner {
                name,
                value_bits: AtomicU64::new(value.to_bits()),
                floating: AtomicBool::new(true),
                version: AtomicU64::new(0),
                lower,
                upper,
                step_size,
            }),
        })
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        f64::from_bits(self.inner.value_bits.load(Ordering::Acquire))
    }

    /// Set a new value. Fails if the value is not finite or outside the bounds.
    pub fn set_value(&self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::Validation(format!(
                "parameter '{}' cannot be set to non-finite {value}",
                self.name()
            )));
        }
        if value < self.inner.lower || value > self.inner.upper {
            return Err(Error::Validation(format!(
                "parameter '{}' value {value} outside bounds ({}, {})",
                self.name(),
                self.inner.lower,
                self.inner.upper
            )));
        }
        self.inner.value_bits.store(value.to_bits(), Ordering::Release);
        self.inner.version.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Set a value clamped into the bounds.
    pub fn set_value_clamped(&self, value: f64) -> Result<()> {
        self.set_value(self.clamp(value))
    }

    /// Clamp `value` into the parameter bounds.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.inner.lower, self.inner.upper)
    }

    /// Bounds `(lower, upper)`; infinite when unbounded.
    pub fn bounds(&self) -> (f64, f64) {
        (self.inner.lower, self.inner.upper)
    }

    /// Step size hint for minimizers and finite differences.
    pub fn step_size(&self) -> f64 {
        self.inner.step_size.unwrap_or_else(|| 1e-3 * self.value().abs().max(1.0))
    }

    /// Whether the parameter is free in a fit.
    pub fn is_floating(&self) -> bool {
        self.inner.floating.load(Ordering::Acquire)
    }

    /// Mark the parameter floating (`true`) or fixed (`false`).
    pub fn set_floating(&self, floating: bool) {
        self.inner.floating.store(floating, Ordering::Release);
    }

    /// Monotonic counter bumped on every value change.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// `true` if both handles point to the same parameter.
    pub fn ptr_eq(&self, other: &Parameter) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Parameter {}

impl Hash for Parameter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name())
            .field("value", &self.value())
            .field("bounds", &self.bounds())
            .field("floating", &self.is_floating())
            .finish()
    }
}

/// Append `params` to `out`, skipping handles already present (order preserving).
pub fn extend_unique(out: &mut Vec<Parameter>, params: impl IntoIterator<Item = Parameter>) {
    for p in params {
        if !out.iter().any(|q| q.ptr_eq(&p)) {
            out.push(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_value_bumps_version() {
        let p = Parameter::bounded("mu", 1.0, 0.0, 5.0).unwrap();
        assert_eq!(p.version(), 0);
        p.set_value(2.0).unwrap();
        assert_eq!(p.value(), 2.0);
        assert_eq!(p.version(), 1);
        assert!(p.set_value(6.0).is_err());
        assert!(p.set_value(f64::NAN).is_err());
        assert_eq!(p.version(), 1);
        p.set_value_clamped(6.0).unwrap();
        assert_eq!(p.value(), 5.0);
    }

    #[test]
    fn test_identity_semantics() {
        let a = Parameter::new("a", 1.0).unwrap();
        let a2 = a.clone();
        let b = Parameter::new("a", 1.0).unwrap();
        assert_eq!(a, a2);
        assert_ne!(a, b);

        a2.set_value(3.0).unwrap();
        assert_eq!(a.value(), 3.0);

        let mut all = vec![a.clone()];
        extend_unique(&mut all, vec![a2, b.clone(), b]);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_floating_flag() {
        let p = Parameter::new("sigma", 1.0).unwrap();
        assert!(p.is_floating());
        p.set_floating(false);
        assert!(!p.is_floating());
    }

    #[test]
    fn test_invalid_construction() {
        assert!(Parameter::bounded("x", 0.0, 1.0, 0.5).is_err());
        assert!(Parameter::bounded("x", 2.0, 0.0, 1.0).is_err());
        assert!(Parameter::new("x", f64::INFINITY).is_err());
        assert!(Parameter::new("x", 1.0).unwrap().with_step_size(0.0).is_err());
    }
}
