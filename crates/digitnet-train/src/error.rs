use digitnet_core::ModelError;
use digitnet_dataset::vision::SampleError;
use digitnet_tensor::TensorError;
use thiserror::Error;

use crate::TrainerState;

/// Errors raised while training a model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainingError {
    /// The training configuration cannot be used.
    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),

    /// There is nothing to train on.
    #[error("The training dataset is empty")]
    EmptyDataset,

    /// The learner cannot move to the requested state.
    #[error("Invalid trainer transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// The current state.
        from: TrainerState,
        /// The requested state.
        to: TrainerState,
    },

    /// A forward or backward pass failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A sample could not be turned into tensors.
    #[error(transparent)]
    Sample(#[from] SampleError),

    /// Tensor allocation failed.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
