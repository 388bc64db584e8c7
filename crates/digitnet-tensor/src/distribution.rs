use rand::{distributions::Standard, Rng};
use serde::{Deserialize, Serialize};

use crate::TensorError;

/// Distribution for random value of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    /// Uniform distribution from 0 (inclusive) to 1 (exclusive).
    Default,

    /// Uniform distribution. The range is inclusive.
    Uniform(f64, f64),

    /// Normal distribution with the given mean and standard deviation.
    Normal(f64, f64),
}

/// Distribution sampler for random value of a tensor.
pub struct DistributionSampler<'a, R: Rng> {
    kind: DistributionSamplerKind,
    rng: &'a mut R,
}

enum DistributionSamplerKind {
    Standard(Standard),
    Uniform(rand::distributions::Uniform<f64>),
    Normal(rand_distr::Normal<f64>),
}

impl<R: Rng> DistributionSampler<'_, R> {
    /// Samples a random value from the distribution.
    pub fn sample(&mut self) -> f32 {
        match &self.kind {
            DistributionSamplerKind::Standard(distribution) => self.rng.sample(distribution),
            DistributionSamplerKind::Uniform(distribution) => {
                self.rng.sample(distribution) as f32
            }
            DistributionSamplerKind::Normal(distribution) => self.rng.sample(distribution) as f32,
        }
    }
}

impl Distribution {
    /// Creates a new distribution sampler.
    ///
    /// # Arguments
    ///
    /// * `rng` - The random number generator.
    ///
    /// # Returns
    ///
    /// The distribution sampler, or an error when the parameters are invalid.
    pub fn sampler<R: Rng>(self, rng: &mut R) -> Result<DistributionSampler<'_, R>, TensorError> {
        let kind = match self {
            Distribution::Default => DistributionSamplerKind::Standard(Standard),
            Distribution::Uniform(low, high) => {
                if !(high - low).is_finite() || low > high {
                    return Err(TensorError::InvalidArgument {
                        op: "random",
                        reason: format!("uniform range [{low}, {high}] is not a finite range"),
                    });
                }
                DistributionSamplerKind::Uniform(rand::distributions::Uniform::new_inclusive(
                    low, high,
                ))
            }
            Distribution::Normal(mean, std) => DistributionSamplerKind::Normal(
                rand_distr::Normal::new(mean, std).map_err(|err| {
                    TensorError::InvalidArgument {
                        op: "random",
                        reason: err.to_string(),
                    }
                })?,
            ),
        };

        Ok(DistributionSampler { kind, rng })
    }
}
