//! Error types for mlfit

use thiserror::Error;

/// mlfit error type
#[derive(Error, Debug)]
pub enum Error {
    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error (malformed input, shape mismatch, bad configuration)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A value that has to be a space with limits is not one.
    #[error("Invalid space: {0}")]
    InvalidSpace(String),

    /// The caller's intention cannot be inferred (e.g. no fit range and inconsistent ranges).
    #[error("Ambiguous intention: {0}")]
    AmbiguousIntention(String),

    /// Two losses of a different kind were combined.
    #[error("Incompatible loss: {0}")]
    IncompatibleLoss(String),

    /// A registered integral was called with a norm range it does not support.
    #[error("Norm range not supported: {0}")]
    NormRangeNotSupported(String),

    /// A registered integral was called with multiple limits it does not support.
    #[error("Multiple limits not supported: {0}")]
    MultipleLimitsNotSupported(String),

    /// No analytic integral is registered for the requested axes at all.
    #[error("No analytic integral registered for axes {axes:?}")]
    NoIntegralForAxes {
        /// Requested axes (sorted).
        axes: Vec<usize>,
    },

    /// An analytic integral exists for the axes, but none covers the requested limits.
    #[error("Analytic integral registered for axes {axes:?}, but not for limits {limits}")]
    NoIntegralForLimits {
        /// Requested axes (sorted).
        axes: Vec<usize>,
        /// Human-readable rendering of the requested limits.
        limits: String,
    },

    /// Numeric integration over a region with infinite bounds.
    #[error("Unbounded limits: {0}")]
    UnboundedLimits(String),

    /// An extended PDF is required but the model is not extended.
    #[error("Not an extended PDF: {0}")]
    NotExtendedPdf(String),

    /// The loss cannot provide an error definition.
    #[error("Error definition unavailable: {0}")]
    ErrordefUnavailable(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

impl Error {
    /// `true` for the "this strategy is not implemented" signal used for fallbacks.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Error::NotImplemented(_))
    }

    /// `true` if no analytic integral is available, so numeric integration may be tried.
    ///
    /// Capability errors (a matching integral exists but refuses the call) are not included.
    pub fn is_missing_integral(&self) -> bool {
        matches!(self, Error::NoIntegralForAxes { .. } | Error::NoIntegralForLimits { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_integral_kinds_are_distinct() {
        let axes_err = Error::NoIntegralForAxes { axes: vec![0, 1] };
        let limits_err = Error::NoIntegralForLimits { axes: vec![0], limits: "[(0, 1)]".into() };
        assert!(axes_err.is_missing_integral());
        assert!(limits_err.is_missing_integral());
        assert!(!Error::NormRangeNotSupported("x".into()).is_missing_integral());
        assert_ne!(axes_err.to_string(), limits_err.to_string());
    }

    #[test]
    fn test_not_implemented_predicate() {
        assert!(Error::NotImplemented("step".into()).is_not_implemented());
        assert!(!Error::Validation("step".into()).is_not_implemented());
    }
}
