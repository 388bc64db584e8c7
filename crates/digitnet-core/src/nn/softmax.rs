use digitnet_tensor::{ops, Result, Shape, Tensor};

use super::{Layer, LayerGrads};
use crate::ModelError;

/// Turns the last dimension of each item into a probability distribution.
#[derive(Debug)]
pub struct Softmax {
    shape: Shape,
}

impl Softmax {
    /// Creates the layer for items of the given shape.
    pub fn new(index: usize, input_shape: &Shape) -> core::result::Result<Self, ModelError> {
        if input_shape.rank() == 0 {
            return Err(ModelError::ShapeMismatch {
                layer: index,
                kind: "softmax",
                expected: "a tensor of rank 1 or more".to_string(),
                actual: input_shape.clone(),
            });
        }

        Ok(Self {
            shape: input_shape.clone(),
        })
    }
}

impl Layer for Softmax {
    fn kind(&self) -> &'static str {
        "softmax"
    }

    fn input_shape(&self) -> &Shape {
        &self.shape
    }

    fn output_shape(&self) -> &Shape {
        &self.shape
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        ops::softmax(input)
    }

    fn backward(&self, _input: &Tensor, output: &Tensor, grad: &Tensor) -> Result<LayerGrads> {
        ops::softmax_backward(output, grad).map(LayerGrads::input_only)
    }

    fn outputs_probabilities(&self) -> bool {
        true
    }
}
