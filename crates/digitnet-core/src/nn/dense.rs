use digitnet_tensor::ops::{matmul, matmul_lhs_transposed, matmul_rhs_transposed};
use digitnet_tensor::{Arena, Result, Shape, Tensor};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{check_rank, Activation, Initializer, Layer, LayerGrads, Param};
use crate::ModelError;

/// Configuration to create a [dense](Dense) layer.
#[derive(new, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseConfig {
    /// The number of output units.
    pub units: usize,
    /// Activation applied to the output.
    #[new(default)]
    #[serde(default)]
    pub activation: Activation,
    /// If a bias should be applied during the transformation.
    #[new(value = "true")]
    #[serde(default = "default_bias")]
    pub bias: bool,
    /// The type of function used to initialize the weights.
    #[new(default)]
    #[serde(default)]
    pub initializer: Initializer,
    /// Shape of one input vector, checked against the previous layer when set.
    #[new(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_shape: Option<Shape>,
}

fn default_bias() -> bool {
    true
}

/// Applies a linear transformation to the input vectors:
///
/// `O = activation(IW + b)`
#[derive(Debug)]
pub struct Dense {
    /// Matrix of shape `[in_features, units]`.
    weight: Param,
    /// Vector of size `units`.
    bias: Option<Param>,
    activation: Activation,
    input_shape: Shape,
    output_shape: Shape,
}

impl DenseConfig {
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

    /// Initialize a new [dense](Dense) layer at position `index` of a model.
    pub fn init<R: Rng>(
        &self,
        index: usize,
        input_shape: &Shape,
        arena: &Arena,
        rng: &mut R,
    ) -> core::result::Result<Dense, ModelError> {
        const KIND: &str = "dense";

        if self.units == 0 {
            return Err(ModelError::InvalidLayer {
                layer: index,
                kind: KIND,
                reason: "a dense layer needs at least one unit".to_string(),
            });
        }

        check_rank(index, KIND, input_shape, 1, "[features], flatten images first")?;

        let features = input_shape.dims[0];
        let weight = self.initializer.init(
            arena,
            [features, self.units],
            features,
            self.units,
            rng,
        )?;
        let bias = if self.bias {
            Some(Param::new("bias", Tensor::zeros(arena, [self.units])?))
        } else {
            None
        };

        Ok(Dense {
            weight: Param::new("weight", weight),
            bias,
            activation: self.activation,
            input_shape: input_shape.clone(),
            output_shape: Shape::new([self.units]),
        })
    }
}

impl Layer for Dense {
    fn kind(&self) -> &'static str {
        "dense"
    }

    fn input_shape(&self) -> &Shape {
        &self.input_shape
    }

    fn output_shape(&self) -> &Shape {
        &self.output_shape
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let output = matmul(input, self.weight.val())?;

        let output = match &self.bias {
            Some(bias) => output.add_row_broadcast(bias.val())?,
            None => output,
        };

        self.activation.forward(output)
    }

    fn backward(&self, input: &Tensor, output: &Tensor, grad: &Tensor) -> Result<LayerGrads> {
        let grad = self.activation.backward(output, grad)?;

        let mut params = vec![matmul_lhs_transposed(input, &grad)?];
        if self.bias.is_some() {
            params.push(grad.sum_rows()?);
        }

        Ok(LayerGrads {
            input: matmul_rhs_transposed(&grad, self.weight.val())?,
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

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn dense(units: usize, features: usize, arena: &Arena) -> Dense {
        DenseConfig::new(units)
            .with_initializer(Initializer::Constant(0.5))
            .init(0, &Shape::new([features]), arena, &mut StdRng::seed_from_u64(0))
            .unwrap()
    }

    #[test]
    fn forward_is_affine() {
        let arena = Arena::new();
        let layer = dense(2, 3, &arena);
        let input = Tensor::from_floats(&arena, [2, 3], &[1.0, 2.0, 3.0, -1.0, 0.0, 1.0]).unwrap();

        let output = layer.forward(&input).unwrap();

        assert_eq!(output.dims(), &[2, 2]);
        output.assert_approx_eq(&[3.0, 3.0, 0.0, 0.0], 1e-6);
    }

    #[test]
    fn backward_shapes_follow_the_parameters() {
        let arena = Arena::new();
        let layer = dense(4, 3, &arena);
        let input = Tensor::ones(&arena, [5, 3]).unwrap();
        let output = layer.forward(&input).unwrap();
        let grad = Tensor::ones(&arena, [5, 4]).unwrap();

        let grads = layer.backward(&input, &output, &grad).unwrap();

        assert_eq!(grads.input.dims(), &[5, 3]);
        assert_eq!(grads.params[0].dims(), &[3, 4]);
        grads.params[1].assert_approx_eq(&[5.0; 4], 1e-6);
        grads.params[0].assert_approx_eq(&[5.0; 12], 1e-6);
        grads.input.assert_approx_eq(&[2.0; 15], 1e-6);
    }

    #[test]
    fn image_input_is_a_shape_mismatch() {
        let arena = Arena::new();
        let result = DenseConfig::new(10).init(
            4,
            &Shape::new([4, 4, 16]),
            &arena,
            &mut StdRng::seed_from_u64(0),
        );

        assert_eq!(
            result.unwrap_err(),
            ModelError::ShapeMismatch {
                layer: 4,
                kind: "dense",
                expected: "[features], flatten images first".to_string(),
                actual: Shape::new([4, 4, 16]),
            }
        );
    }
}
