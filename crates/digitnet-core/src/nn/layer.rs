use core::fmt::Debug;

use digitnet_tensor::{Result, Shape, Tensor};

/// A learnable tensor of a layer.
#[derive(Debug)]
pub struct Param {
    name: &'static str,
    value: Tensor,
}

impl Param {
    /// Creates a parameter.
    pub fn new(name: &'static str, value: Tensor) -> Self {
        Self { name, value }
    }

    /// Name of the parameter within its layer, `weight` or `bias`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The current value.
    pub fn val(&self) -> &Tensor {
        &self.value
    }

    /// Replaces the value, returning the previous one.
    pub fn set(&mut self, value: Tensor) -> Tensor {
        core::mem::replace(&mut self.value, value)
    }

    /// Number of scalars in the parameter.
    pub fn num_params(&self) -> usize {
        self.value.num_elements()
    }
}

/// Gradients computed by [Layer::backward].
#[derive(Debug)]
pub struct LayerGrads {
    /// Gradient of the layer input.
    pub input: Tensor,
    /// Gradient of each parameter, in the order of [Layer::params].
    pub params: Vec<Tensor>,
}

impl LayerGrads {
    /// Gradients of a layer without parameters.
    pub fn input_only(input: Tensor) -> Self {
        Self {
            input,
            params: Vec::new(),
        }
    }
}

/// A layer of a sequential model.
///
/// Shapes are given without the batch dimension, while [forward](Layer::forward) and
/// [backward](Layer::backward) work on batches.
pub trait Layer: Send + Sync + Debug {
    /// Short name of the layer kind.
    fn kind(&self) -> &'static str;

    /// Shape of one input item.
    fn input_shape(&self) -> &Shape;

    /// Shape of one output item.
    fn output_shape(&self) -> &Shape;

    /// Applies the layer to a batch.
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Computes the gradients of the layer given the input and output of its forward pass and
    /// the gradient of the output.
    fn backward(&self, input: &Tensor, output: &Tensor, grad: &Tensor) -> Result<LayerGrads>;

    /// The learnable parameters.
    fn params(&self) -> Vec<&Param> {
        Vec::new()
    }

    /// The learnable parameters, for the optimizer to update.
    fn params_mut(&mut self) -> Vec<&mut Param> {
        Vec::new()
    }

    /// Whether every output row is a probability distribution.
    fn outputs_probabilities(&self) -> bool {
        false
    }

    /// Number of learnable scalars.
    fn num_params(&self) -> usize {
        self.params().iter().map(|param| param.num_params()).sum()
    }
}
