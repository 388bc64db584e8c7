use digitnet_tensor::ops::{self, MaxPool2dOptions};
use digitnet_tensor::{Result, Shape, Tensor};
use serde::{Deserialize, Serialize};

use super::{check_rank, Layer, LayerGrads};
use crate::ModelError;

/// Configuration to create a [2D max pooling](MaxPool2d) layer.
#[derive(new, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxPool2dConfig {
    /// The size of the pooling window.
    pub kernel_size: [usize; 2],
    /// The strides, the window size when unset.
    #[new(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stride: Option<[usize; 2]>,
    /// Shape of one input image, checked against the previous layer when set.
    #[new(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_shape: Option<Shape>,
}

/// Applies a 2D max pooling over channels-last images.
#[derive(Debug)]
pub struct MaxPool2d {
    options: MaxPool2dOptions,
    input_shape: Shape,
    output_shape: Shape,
}

impl MaxPool2dConfig {
    /// Set the stride.
    pub fn with_stride(mut self, stride: [usize; 2]) -> Self {
        self.stride = Some(stride);
        self
    }

    /// Set the expected input shape.
    pub fn with_input_shape<S: Into<Shape>>(mut self, input_shape: S) -> Self {
        self.input_shape = Some(input_shape.into());
        self
    }

    /// Initialize a new [max pooling](MaxPool2d) layer at position `index` of a model.
    pub fn init(
        &self,
        index: usize,
        input_shape: &Shape,
    ) -> core::result::Result<MaxPool2d, ModelError> {
        const KIND: &str = "max_pool2d";

        let stride = self.stride.unwrap_or(self.kernel_size);
        if self.kernel_size.contains(&0) || stride.contains(&0) {
            return Err(ModelError::InvalidLayer {
                layer: index,
                kind: KIND,
                reason: format!(
                    "kernel size {:?} and stride {stride:?} must be positive",
                    self.kernel_size
                ),
            });
        }

        check_rank(index, KIND, input_shape, 3, "[height, width, channels]")?;

        let options = MaxPool2dOptions::new(self.kernel_size, stride);
        let dims = &input_shape.dims;
        let [out_height, out_width] =
            options
                .output_size(dims[0], dims[1])
                .ok_or_else(|| ModelError::ShapeMismatch {
                    layer: index,
                    kind: KIND,
                    expected: format!(
                        "an image of at least {}x{} pixels",
                        self.kernel_size[0], self.kernel_size[1]
                    ),
                    actual: input_shape.clone(),
                })?;

        Ok(MaxPool2d {
            options,
            input_shape: input_shape.clone(),
            output_shape: Shape::new([out_height, out_width, dims[2]]),
        })
    }
}

impl Layer for MaxPool2d {
    fn kind(&self) -> &'static str {
        "max_pool2d"
    }

    fn input_shape(&self) -> &Shape {
        &self.input_shape
    }

    fn output_shape(&self) -> &Shape {
        &self.output_shape
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        ops::max_pool2d(input, self.options)
    }

    fn backward(&self, input: &Tensor, _output: &Tensor, grad: &Tensor) -> Result<LayerGrads> {
        ops::max_pool2d_backward(input, grad, self.options).map(LayerGrads::input_only)
    }
}
