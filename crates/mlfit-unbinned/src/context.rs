//! Execution context for likelihood evaluation.
//!
//! Numeric settings that would otherwise be process-wide state (Monte Carlo sample budget,
//! batch size, sampler) live in an explicit [`RunContext`] that losses hold and pass to the
//! models they evaluate.

use crate::integration::{HaltonSampler, Sampler, UniformSampler};
use mlfit_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Which unit-hypercube sampler Monte Carlo integration uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplerKind {
    /// Deterministic Halton sequence.
    #[default]
    Halton,
    /// Seeded pseudo-random uniform draws.
    Uniform {
        /// Base seed.
        seed: u64,
    },
}

/// Numeric settings for evaluating models and losses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunContext {
    /// Maximum number of Monte Carlo samples evaluated in one batch.
    pub chunk_size: usize,
    /// Monte Carlo draws per integrated dimension.
    pub mc_draws_per_dim: usize,
    /// Sampler used for Monte Carlo integration.
    pub sampler: SamplerKind,
}

impl Default for RunContext {
    fn default() -> Self {
        Self { chunk_size: 1_000_000, mc_draws_per_dim: 10_000, sampler: SamplerKind::Halton }
    }
}

impl RunContext {
    /// Parse a context from JSON; missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        let ctx: Self = serde_json::from_str(s)?;
        ctx.validate()?;
        Ok(ctx)
    }

    /// Check that the settings are usable.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Validation("RunContext.chunk_size must be > 0".into()));
        }
        if self.mc_draws_per_dim == 0 {
            return Err(Error::Validation("RunContext.mc_draws_per_dim must be > 0".into()));
        }
        Ok(())
    }

    /// Instantiate the configured sampler.
    pub fn sampler(&self) -> Box<dyn Sampler> {
        match self.sampler {
            SamplerKind::Halton => Box::new(HaltonSampler),
            SamplerKind::Uniform { seed } => Box::new(UniformSampler::new(seed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let ctx = RunContext::from_json(r#"{"chunk_size": 500}"#).unwrap();
        assert_eq!(ctx.chunk_size, 500);
        assert_eq!(ctx.mc_draws_per_dim, RunContext::default().mc_draws_per_dim);
        assert_eq!(ctx.sampler, SamplerKind::Halton);
    }

    #[test]
    fn test_uniform_sampler_config() {
        let ctx =
            RunContext::from_json(r#"{"sampler": {"kind": "uniform", "seed": 7}}"#).unwrap();
        assert_eq!(ctx.sampler, SamplerKind::Uniform { seed: 7 });
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            RunContext::from_json(r#"{"chunk_size": 0}"#),
            Err(Error::Validation(_))
        ));
        assert!(matches!(RunContext::from_json("{"), Err(Error::Json(_))));
    }
}
