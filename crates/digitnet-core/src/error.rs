use digitnet_tensor::{Shape, TensorError};
use thiserror::Error;

/// Errors raised while building or running a model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// A layer does not accept the shape produced by the layers before it.
    #[error("Layer {layer} ({kind}) expects {expected}, got {actual}")]
    ShapeMismatch {
        /// Index of the offending layer in the model specification.
        layer: usize,
        /// Kind of the offending layer.
        kind: &'static str,
        /// Description of the shape the layer accepts.
        expected: String,
        /// The shape it was given.
        actual: Shape,
    },

    /// A layer specification is invalid regardless of its input.
    #[error("Layer {layer} ({kind}) is invalid: {reason}")]
    InvalidLayer {
        /// Index of the offending layer in the model specification.
        layer: usize,
        /// Kind of the offending layer.
        kind: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The model specification has no layer.
    #[error("A model needs at least one layer")]
    EmptyModel,

    /// A batch handed to the model does not have the shape it was built for.
    #[error("Expected a batch of {expected}, got {actual}")]
    InvalidBatch {
        /// Shape of a single item.
        expected: Shape,
        /// Shape of the batch.
        actual: Shape,
    },

    /// A tensor operation failed.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
