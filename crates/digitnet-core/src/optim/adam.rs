use digitnet_tensor::{Result, Tensor, TensorCollection};
use serde::{Deserialize, Serialize};

use super::Optimizer;
use crate::config::Config;
use crate::LearningRate;

/// Configuration to create the [Adam](Adam) optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    /// Parameter for Adam.
    pub beta_1: f32,
    /// Parameter for Adam.
    pub beta_2: f32,
    /// A value required for numerical stability.
    pub epsilon: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for AdamConfig {}

impl AdamConfig {
    /// Creates the configuration with its default values.
    pub fn new() -> Self {
        Self {
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-5,
        }
    }

    /// Set `beta_1`.
    pub fn with_beta_1(mut self, beta_1: f32) -> Self {
        self.beta_1 = beta_1;
        self
    }

    /// Set `beta_2`.
    pub fn with_beta_2(mut self, beta_2: f32) -> Self {
        self.beta_2 = beta_2;
        self
    }

    /// Set `epsilon`.
    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Initialize Adam optimizer.
    pub fn init(&self) -> Adam {
        Adam {
            momentum: AdaptiveMomentum {
                beta_1: self.beta_1,
                beta_2: self.beta_2,
                epsilon: self.epsilon,
            },
        }
    }
}

/// Adam optimizer as described in the paper [Adam: A Method for Stochastic Optimization](https://arxiv.org/pdf/1412.6980.pdf).
#[derive(Debug, Clone)]
pub struct Adam {
    momentum: AdaptiveMomentum,
}

/// Adam state of one parameter.
#[derive(new, Debug)]
pub struct AdaptiveMomentumState {
    /// Number of steps applied.
    pub time: usize,
    /// First moment estimate.
    pub moment_1: Tensor,
    /// Second moment estimate.
    pub moment_2: Tensor,
}

impl TensorCollection for AdaptiveMomentumState {
    fn tensor_count(&self) -> usize {
        2
    }
}

#[derive(Debug, Clone)]
struct AdaptiveMomentum {
    beta_1: f32,
    beta_2: f32,
    epsilon: f32,
}

impl AdaptiveMomentum {
    fn transform(
        &self,
        grad: &Tensor,
        state: Option<&AdaptiveMomentumState>,
    ) -> Result<(Tensor, AdaptiveMomentumState)> {
        let (beta_1, beta_2) = (self.beta_1, self.beta_2);

        let state = match state {
            Some(state) => {
                let moment_1 = state.moment_1.zip_map(grad, "adam", |moment, grad| {
                    moment * beta_1 + grad * (1.0 - beta_1)
                })?;
                let moment_2 = state.moment_2.zip_map(grad, "adam", |moment, grad| {
                    moment * beta_2 + grad * grad * (1.0 - beta_2)
                })?;

                AdaptiveMomentumState::new(state.time + 1, moment_1, moment_2)
            }
            None => {
                let moment_1 = grad.mul_scalar(1.0 - beta_1)?;
                let moment_2 = grad.map(|grad| grad * grad * (1.0 - beta_2))?;

                AdaptiveMomentumState::new(1, moment_1, moment_2)
            }
        };

        let time = state.time as i32;
        let correction_1 = 1.0 - beta_1.powi(time);
        let correction_2 = 1.0 - beta_2.powi(time);
        let epsilon = self.epsilon;

        let grad = state
            .moment_1
            .zip_map(&state.moment_2, "adam", |moment_1, moment_2| {
                (moment_1 / correction_1) / ((moment_2 / correction_2).sqrt() + epsilon)
            })?;

        Ok((grad, state))
    }
}

impl Optimizer for Adam {
    type State = AdaptiveMomentumState;

    fn step(
        &self,
        lr: LearningRate,
        tensor: &Tensor,
        grad: &Tensor,
        state: Option<&Self::State>,
    ) -> Result<(Tensor, Self::State)> {
        let (grad, state) = self.momentum.transform(grad, state)?;
        let lr = lr as f32;
        let tensor = tensor.zip_map(&grad, "adam", |value, delta| value - lr * delta)?;

        Ok((tensor, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use digitnet_tensor::Arena;

    const LEARNING_RATE: LearningRate = 0.01;

    #[test]
    fn first_step_moves_by_the_learning_rate() {
        let arena = Arena::new();
        let optim = AdamConfig::new().init();
        let tensor = Tensor::from_floats(&arena, [3], &[1.0, 1.0, 1.0]).unwrap();
        let grad = Tensor::from_floats(&arena, [3], &[0.5, -2.0, 0.0]).unwrap();

        let (tensor, state) = optim.step(LEARNING_RATE, &tensor, &grad, None).unwrap();

        // The bias-corrected update of the first step is sign(grad) * lr.
        tensor.assert_approx_eq(&[0.99, 1.01, 1.0], 1e-4);
        assert_eq!(state.time, 1);
    }

    #[test]
    fn moments_accumulate_over_steps() {
        let arena = Arena::new();
        let optim = AdamConfig::new().with_epsilon(1e-8).init();
        let mut tensor = Tensor::from_floats(&arena, [1], &[0.0]).unwrap();
        let grad = Tensor::from_floats(&arena, [1], &[1.0]).unwrap();
        let mut state = None;

        for _ in 0..3 {
            let (next, next_state) = optim
                .step(LEARNING_RATE, &tensor, &grad, state.as_ref())
                .unwrap();
            tensor = next;
            state = Some(next_state);
        }

        let state = state.unwrap();
        assert_eq!(state.time, 3);
        state
            .moment_1
            .assert_approx_eq(&[1.0 - 0.9f32.powi(3)], 1e-6);
        tensor.assert_approx_eq(&[-0.03], 1e-5);
        assert_eq!(arena.live_tensors(), 4);
    }

    #[test]
    fn config_round_trip() {
        let config = AdamConfig::new().with_beta_1(0.8);
        let json = crate::config::config_to_json(&config).unwrap();

        assert_eq!(AdamConfig::load_binary(json.as_bytes()).unwrap(), config);
    }
}
