use digitnet_tensor::{Result, Shape, Tensor};

use super::{Layer, LayerGrads};
use crate::ModelError;

/// Flattens each item of a batch into a vector.
#[derive(Debug)]
pub struct Flatten {
    input_shape: Shape,
    output_shape: Shape,
}

impl Flatten {
    /// Creates the layer for items of the given shape.
    pub fn new(index: usize, input_shape: &Shape) -> core::result::Result<Self, ModelError> {
        if input_shape.rank() == 0 {
            return Err(ModelError::ShapeMismatch {
                layer: index,
                kind: "flatten",
                expected: "a tensor of rank 1 or more".to_string(),
                actual: input_shape.clone(),
            });
        }

        Ok(Self {
            input_shape: input_shape.clone(),
            output_shape: Shape::new([input_shape.num_elements()]),
        })
    }
}

impl Layer for Flatten {
    fn kind(&self) -> &'static str {
        "flatten"
    }

    fn input_shape(&self) -> &Shape {
        &self.input_shape
    }

    fn output_shape(&self) -> &Shape {
        &self.output_shape
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        input.reshape(self.output_shape.batched(input.shape().batch_size()))
    }

    fn backward(&self, input: &Tensor, _output: &Tensor, grad: &Tensor) -> Result<LayerGrads> {
        grad.reshape(input.shape()).map(LayerGrads::input_only)
    }
}
