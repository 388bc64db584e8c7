use digitnet_tensor::{Arena, Shape};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Conv2dConfig, DenseConfig, Flatten, Layer, MaxPool2dConfig, Softmax};
use crate::ModelError;

/// Specification of one layer of a sequential model.
///
/// Serialized with a `kind` tag, e.g. `{ "kind": "dense", "units": 10, "activation": "softmax" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerSpec {
    /// 2D convolution.
    Conv2d(Conv2dConfig),
    /// 2D max pooling.
    MaxPool2d(MaxPool2dConfig),
    /// Flattening of each item into a vector.
    Flatten,
    /// Fully connected layer.
    Dense(DenseConfig),
    /// Standalone softmax over the last dimension.
    Softmax,
}

impl LayerSpec {
    /// Short name of the layer kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conv2d(_) => "conv2d",
            Self::MaxPool2d(_) => "max_pool2d",
            Self::Flatten => "flatten",
            Self::Dense(_) => "dense",
            Self::Softmax => "softmax",
        }
    }

    /// The input shape the specification declares, if any.
    pub fn declared_input_shape(&self) -> Option<&Shape> {
        match self {
            Self::Conv2d(config) => config.input_shape.as_ref(),
            Self::MaxPool2d(config) => config.input_shape.as_ref(),
            Self::Dense(config) => config.input_shape.as_ref(),
            Self::Flatten | Self::Softmax => None,
        }
    }

    /// Creates the layer at position `index` of a model, given the shape produced by the layers
    /// before it.
    pub fn init<R: Rng>(
        &self,
        index: usize,
        input_shape: &Shape,
        arena: &Arena,
        rng: &mut R,
    ) -> Result<Box<dyn Layer>, ModelError> {
        if let Some(declared) = self.declared_input_shape() {
            if declared != input_shape {
                return Err(ModelError::ShapeMismatch {
                    layer: index,
                    kind: self.kind(),
                    expected: declared.to_string(),
                    actual: input_shape.clone(),
                });
            }
        }

        let layer: Box<dyn Layer> = match self {
            Self::Conv2d(config) => Box::new(config.init(index, input_shape, arena, rng)?),
            Self::MaxPool2d(config) => Box::new(config.init(index, input_shape)?),
            Self::Flatten => Box::new(Flatten::new(index, input_shape)?),
            Self::Dense(config) => Box::new(config.init(index, input_shape, arena, rng)?),
            Self::Softmax => Box::new(Softmax::new(index, input_shape)?),
        };

        log::debug!(
            "Layer {index} ({}): {} -> {}, {} parameters",
            layer.kind(),
            layer.input_shape(),
            layer.output_shape(),
            layer.num_params()
        );

        Ok(layer)
    }
}

impl From<Conv2dConfig> for LayerSpec {
    fn from(config: Conv2dConfig) -> Self {
        Self::Conv2d(config)
    }
}

impl From<MaxPool2dConfig> for LayerSpec {
    fn from(config: MaxPool2dConfig) -> Self {
        Self::MaxPool2d(config)
    }
}

impl From<DenseConfig> for LayerSpec {
    fn from(config: DenseConfig) -> Self {
        Self::Dense(config)
    }
}

pub(crate) fn check_rank(
    index: usize,
    kind: &'static str,
    shape: &Shape,
    rank: usize,
    expected: &str,
) -> Result<(), ModelError> {
    if shape.rank() != rank {
        return Err(ModelError::ShapeMismatch {
            layer: index,
            kind,
            expected: expected.to_string(),
            actual: shape.clone(),
        });
    }

    Ok(())
}
