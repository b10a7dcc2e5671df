//! Unit-hypercube samplers for Monte Carlo integration.

use mlfit_core::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of points in the unit hypercube `[0, 1)^dim`.
///
/// `offset` is the position of the first requested point in the sampler's stream, so a run
/// split into batches draws the same points as a single-shot run of the same total size.
pub trait Sampler: Send + Sync {
    /// Return `dim` columns of `n` values each, all in `[0, 1)`.
    fn sample(&self, dim: usize, n: usize, offset: usize) -> Result<Vec<Vec<f64>>>;
}

/// Deterministic Halton low-discrepancy sequence (radical inverse in the first `dim` primes).
///
/// Point `k` of the stream uses sequence index `k + 1`; index 0 (the origin) is skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct HaltonSampler;

impl Sampler for HaltonSampler {
    fn sample(&self, dim: usize, n: usize, offset: usize) -> Result<Vec<Vec<f64>>> {
        if dim == 0 {
            return Err(Error::Validation("Halton sampling requires dim > 0".into()));
        }
        let primes = small_primes(dim);
        let columns = primes
            .iter()
            .map(|&base| (offset + 1..=offset + n).map(|i| radical_inverse(i, base)).collect())
            .collect();
        Ok(columns)
    }
}

/// Pseudo-random uniform sampler (`StdRng`), reseeded from `seed + offset` per request.
#[derive(Debug, Clone, Copy)]
pub struct UniformSampler {
    seed: u64,
}

impl UniformSampler {
    /// Create a sampler with the given base seed.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl Sampler for UniformSampler {
    fn sample(&self, dim: usize, n: usize, offset: usize) -> Result<Vec<Vec<f64>>> {
        if dim == 0 {
            return Err(Error::Validation("uniform sampling requires dim > 0".into()));
        }
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(offset as u64));
        let mut columns = vec![Vec::with_capacity(n); dim];
        for _ in 0..n {
            for col in columns.iter_mut() {
                col.push(rng.random::<f64>());
            }
        }
        Ok(columns)
    }
}

/// Return the first `n` prime numbers.
fn small_primes(n: usize) -> Vec<usize> {
    let mut primes = Vec::with_capacity(n);
    let mut candidate = 2usize;
    while primes.len() < n {
        if primes.iter().all(|&p| candidate % p != 0) {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
}

/// Radical-inverse function (van der Corput sequence) in the given base.
fn radical_inverse(mut i: usize, base: usize) -> f64 {
    let mut result = 0.0;
    let mut fraction = 1.0 / base as f64;
    while i > 0 {
        result += (i % base) as f64 * fraction;
        i /= base;
        fraction /= base as f64;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radical_inverse_base2() {
        assert!((radical_inverse(1, 2) - 0.5).abs() < 1e-15);
        assert!((radical_inverse(2, 2) - 0.25).abs() < 1e-15);
        assert!((radical_inverse(3, 2) - 0.75).abs() < 1e-15);
    }

    #[test]
    fn test_small_primes() {
        assert_eq!(small_primes(0), Vec::<usize>::new());
        assert_eq!(small_primes(5), vec![2, 3, 5, 7, 11]);
    }

    #[test]
    fn test_halton_offset_matches_single_shot() {
        let s = HaltonSampler;
        let full = s.sample(3, 100, 0).unwrap();
        let head = s.sample(3, 40, 0).unwrap();
        let tail = s.sample(3, 60, 40).unwrap();
        for d in 0..3 {
            let joined: Vec<f64> = head[d].iter().chain(&tail[d]).copied().collect();
            assert_eq!(joined, full[d]);
        }
    }

    #[test]
    fn test_samples_in_unit_interval() {
        for cols in [HaltonSampler.sample(2, 500, 7).unwrap(), UniformSampler::new(3).sample(2, 500, 7).unwrap()]
        {
            assert_eq!(cols.len(), 2);
            assert!(cols.iter().flatten().all(|&u| (0.0..1.0).contains(&u)));
        }
    }

    #[test]
    fn test_uniform_reproducible() {
        let s = UniformSampler::new(42);
        assert_eq!(s.sample(1, 10, 5).unwrap(), s.sample(1, 10, 5).unwrap());
        assert_ne!(s.sample(1, 10, 5).unwrap(), s.sample(1, 10, 6).unwrap());
    }

    #[test]
    fn test_zero_dim_rejected() {
        assert!(HaltonSampler.sample(0, 1, 0).is_err());
    }
}
