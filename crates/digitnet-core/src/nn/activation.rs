use digitnet_tensor::{ops, Result, Tensor};
use serde::{Deserialize, Serialize};

/// Activation applied by a layer after its affine transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Identity.
    #[default]
    Linear,
    /// Rectified linear unit.
    Relu,
    /// Softmax over the last dimension.
    Softmax,
}

impl Activation {
    /// Applies the activation.
    pub fn forward(&self, tensor: Tensor) -> Result<Tensor> {
        match self {
            Self::Linear => Ok(tensor),
            Self::Relu => ops::relu(&tensor),
            Self::Softmax => ops::softmax(&tensor),
        }
    }

    /// Gradient of the activation input given the activation output and its gradient.
    pub fn backward(&self, output: &Tensor, grad: &Tensor) -> Result<Tensor> {
        match self {
            Self::Linear => grad.try_clone(),
            // The output is positive exactly where the input is.
            Self::Relu => ops::relu_backward(output, grad),
            Self::Softmax => ops::softmax_backward(output, grad),
        }
    }
}
