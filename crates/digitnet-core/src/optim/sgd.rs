use digitnet_tensor::{Result, Tensor};
use serde::{Deserialize, Serialize};

use super::Optimizer;
use crate::config::Config;
use crate::LearningRate;

/// Configuration to create the [Sgd](Sgd) optimizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SgdConfig {}

impl Config for SgdConfig {}

impl SgdConfig {
    /// Creates the configuration.
    pub fn new() -> Self {
        Self {}
    }

    /// Initialize the plain gradient descent optimizer.
    pub fn init(&self) -> Sgd {
        Sgd
    }
}

/// Plain stochastic gradient descent: `param - lr * grad`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sgd;

impl Optimizer for Sgd {
    type State = ();

    fn step(
        &self,
        lr: LearningRate,
        tensor: &Tensor,
        grad: &Tensor,
        _state: Option<&Self::State>,
    ) -> Result<(Tensor, Self::State)> {
        let lr = lr as f32;
        let tensor = tensor.zip_map(grad, "sgd", |value, grad| value - lr * grad)?;

        Ok((tensor, ()))
    }
}
