use digitnet_core::ModelError;
use digitnet_dataset::vision::PreprocessError;
use digitnet_tensor::TensorError;
use digitnet_train::TrainingError;
use thiserror::Error;

/// Errors surfaced by the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The drawing could not be turned into a model input.
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    /// The model refused its input.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The training run failed.
    #[error(transparent)]
    Training(#[from] TrainingError),

    /// Tensor allocation failed.
    #[error(transparent)]
    Tensor(#[from] TensorError),

    /// The model produced no probability.
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),
}
