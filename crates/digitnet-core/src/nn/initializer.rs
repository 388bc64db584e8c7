use digitnet_tensor::{Arena, Distribution, Result, Shape, Tensor};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Enum specifying with what values a tensor should be initialized
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initializer {
    /// Fills tensor with specified value everywhere
    Constant(f64),
    /// Fills tensor with 1s everywhere
    Ones,
    /// Fills tensor with 0s everywhere
    Zeros,
    /// Fills tensor with values drawn uniformly between specified values
    Uniform(f64, f64),
    /// Fills tensor with values drawn uniformly between -sqrt(1/fan_in) and sqrt(1/fan_in).
    NormalizedUniform,
    /// Fills tensor with values drawn from normal distribution with specified mean and std
    Normal(f64, f64),
    /// Fills tensor with values according to the uniform version of Xavier Glorot initialization described in [Understanding the difficulty of training deep feedforward neural networks](https://proceedings.mlr.press/v9/glorot10a/glorot10a.pdf)
    XavierUniform(f64),
    /// Fills tensor with values according to the normal version of Xavier Glorot initialization described in [Understanding the difficulty of training deep feedforward neural networks](https://proceedings.mlr.press/v9/glorot10a/glorot10a.pdf)
    XavierNormal(f64),
}

impl Default for Initializer {
    fn default() -> Self {
        Self::XavierUniform(1.0)
    }
}

impl Initializer {
    /// Creates a tensor of the given shape.
    ///
    /// # Params
    ///
    /// - fan_in: number of inputs contributing to one output unit.
    /// - fan_out: number of outputs one input unit contributes to.
    pub fn init<S: Into<Shape>, R: Rng>(
        &self,
        arena: &Arena,
        shape: S,
        fan_in: usize,
        fan_out: usize,
        rng: &mut R,
    ) -> Result<Tensor> {
        let shape = shape.into();

        match self {
            Self::Constant(value) => Tensor::full(arena, shape, *value as f32),
            Self::Ones => Tensor::ones(arena, shape),
            Self::Zeros => Tensor::zeros(arena, shape),
            Self::Uniform(a, b) => Tensor::random(arena, shape, Distribution::Uniform(*a, *b), rng),
            Self::NormalizedUniform => {
                let k = (1.0 / fan_in.max(1) as f64).sqrt();
                Tensor::random(arena, shape, Distribution::Uniform(-k, k), rng)
            }
            Self::Normal(mean, std) => {
                Tensor::random(arena, shape, Distribution::Normal(*mean, *std), rng)
            }
            Self::XavierUniform(gain) => {
                let a = gain * (6.0 / fan_sum(fan_in, fan_out)).sqrt();
                Tensor::random(arena, shape, Distribution::Uniform(-a, a), rng)
            }
            Self::XavierNormal(gain) => {
                let std = gain * (2.0 / fan_sum(fan_in, fan_out)).sqrt();
                Tensor::random(arena, shape, Distribution::Normal(0.0, std), rng)
            }
        }
    }
}

fn fan_sum(fan_in: usize, fan_out: usize) -> f64 {
    (fan_in + fan_out).max(1) as f64
}
