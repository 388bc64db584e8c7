use digitnet_tensor::ops::{self, conv_output_size, same_padding, Conv2dOptions};
use digitnet_tensor::{Arena, Result, Shape, Tensor};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{check_rank, Activation, Initializer, Layer, LayerGrads, Param};
use crate::ModelError;

/// Configuration to create a [2D convolution](Conv2d) layer.
#[derive(new, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv2dConfig {
    /// The number of filters, which is the number of output channels.
    pub filters: usize,
    /// The size of the kernel.
    pub kernel_size: [usize; 2],
    /// The stride of the convolution.
    #[new(value = "[1, 1]")]
    #[serde(default = "default_stride")]
    pub stride: [usize; 2],
    /// The padding configuration.
    #[new(default)]
    #[serde(default)]
    pub padding: PaddingConfig,
    /// Activation applied to the output.
    #[new(value = "Activation::Relu")]
    #[serde(default = "default_activation")]
    pub activation: Activation,
    /// If bias should be added to the output.
    #[new(value = "true")]
    #[serde(default = "default_bias")]
    pub bias: bool,
    /// The type of function used to initialize the weights.
    #[new(default)]
    #[serde(default)]
    pub initializer: Initializer,
    /// Shape of one input image, checked against the previous layer when set.
    #[new(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_shape: Option<Shape>,
}

/// Padding configuration for 2D convolution [config](Conv2dConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingConfig {
    /// Dynamically calculate the amount of padding necessary to ensure that the output size will
    /// be the same as the input for odd kernels.
    Same,
    /// Same as no padding.
    #[default]
    Valid,
    /// Applies the specified amount of padding to all inputs.
    Explicit(usize, usize),
}

fn default_stride() -> [usize; 2] {
    [1, 1]
}

fn default_activation() -> Activation {
    Activation::Relu
}

fn default_bias() -> bool {
    true
}

impl PaddingConfig {
    fn resolve(&self, kernel_size: [usize; 2]) -> [usize; 2] {
        match self {
            Self::Same => [same_padding(kernel_size[0]), same_padding(kernel_size[1])],
            Self::Valid => [0, 0],
            Self::Explicit(height, width) => [*height, *width],
        }
    }
}

/// Applies a 2D convolution over channels-last images.
///
/// # Params
///
/// - weight: Tensor of shape `[kernel_height, kernel_width, channels, filters]`.
///
/// - bias: Tensor of shape `[filters]`, initialized with zeros.
#[derive(Debug)]
pub struct Conv2d {
    weight: Param,
    bias: Option<Param>,
    options: Conv2dOptions,
    activation: Activation,
    input_shape: Shape,
    output_shape: Shape,
}

impl Conv2dConfig {
    /// Set the stride.
    pub fn with_stride(mut self, stride: [usize; 2]) -> Self {
        self.stride = stride;
        self
    }

    /// Set the padding.
    pub fn with_padding(mut self, padding: PaddingConfig) -> Self {
        self.padding = padding;
        self
    }

    /// Set the activation.
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Set whether a bias is added.
    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Set the weight initializer.
    pub fn with_initializer(mut self, initializer: Initializer) -> Self {
        self.initializer = initializer;
        self
    }

    /// Set the expected input shape.
    pub fn with_input_shape<S: Into<Shape>>(mut self, input_shape: S) -> Self {
        self.input_shape = Some(input_shape.into());
        self
    }

    /// Initialize a new [conv2d](Conv2d) layer at position `index` of a model.
    pub fn init<R: Rng>(
        &self,
        index: usize,
        input_shape: &Shape,
        arena: &Arena,
        rng: &mut R,
    ) -> core::result::Result<Conv2d, ModelError> {
        const KIND: &str = "conv2d";

        if self.filters == 0 || self.kernel_size.contains(&0) || self.stride.contains(&0) {
            return Err(ModelError::InvalidLayer {
                layer: index,
                kind: KIND,
                reason: format!(
                    "filters ({}), kernel size {:?} and stride {:?} must be positive",
                    self.filters, self.kernel_size, self.stride
                ),
            });
        }

        check_rank(index, KIND, input_shape, 3, "[height, width, channels]")?;

        let dims = &input_shape.dims;
        let (height, width, channels) = (dims[0], dims[1], dims[2]);
        let [kernel_height, kernel_width] = self.kernel_size;
        let padding = self.padding.resolve(self.kernel_size);

        let out_height = conv_output_size(height, kernel_height, self.stride[0], padding[0]);
        let out_width = conv_output_size(width, kernel_width, self.stride[1], padding[1]);

        let (Some(out_height), Some(out_width)) = (out_height, out_width) else {
            return Err(ModelError::ShapeMismatch {
                layer: index,
                kind: KIND,
                expected: format!(
                    "an image of at least {}x{} pixels",
                    kernel_height.saturating_sub(2 * padding[0]),
                    kernel_width.saturating_sub(2 * padding[1])
                ),
                actual: input_shape.clone(),
            });
        };

        let weight = self.initializer.init(
            arena,
            [kernel_height, kernel_width, channels, self.filters],
            kernel_height * kernel_width * channels,
            kernel_height * kernel_width * self.filters,
            rng,
        )?;
        let bias = if self.bias {
            Some(Param::new("bias", Tensor::zeros(arena, [self.filters])?))
        } else {
            None
        };

        Ok(Conv2d {
            weight: Param::new("weight", weight),
            bias,
            options: Conv2dOptions::new(self.stride, padding),
            activation: self.activation,
            input_shape: input_shape.clone(),
            output_shape: Shape::new([out_height, out_width, self.filters]),
        })
    }
}

impl Conv2d {
    /// The convolution options.
    pub fn options(&self) -> Conv2dOptions {
        self.options
    }

    /// The activation applied to the output.
    pub fn activation(&self) -> Activation {
        self.activation
    }
}

impl Layer for Conv2d {
    fn kind(&self) -> &'static str {
        "conv2d"
    }

    fn input_shape(&self) -> &Shape {
        &self.input_shape
    }

    fn output_shape(&self) -> &Shape {
        &self.output_shape
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let output = ops::conv2d(
            input,
            self.weight.val(),
            self.bias.as_ref().map(Param::val),
            self.options,
        )?;

        self.activation.forward(output)
    }

    fn backward(&self, input: &Tensor, output: &Tensor, grad: &Tensor) -> Result<LayerGrads> {
        let grad = self.activation.backward(output, grad)?;
        let grads = ops::conv2d_backward(input, self.weight.val(), &grad, self.options)?;

        let mut params = vec![grads.weight];
        if self.bias.is_some() {
            params.push(grads.bias);
        }

        Ok(LayerGrads {
            input: grads.input,
            params,
        })
    }

    fn params(&self) -> Vec<&Param> {
        core::iter::once(&self.weight).chain(self.bias.as_ref()).collect()
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        core::iter::once(&mut self.weight)
            .chain(self.bias.as_mut())
            .collect()
    }

    fn outputs_probabilities(&self) -> bool {
        self.activation == Activation::Softmax
    }
}
