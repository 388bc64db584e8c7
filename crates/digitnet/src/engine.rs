use digitnet_core::config::Config;
use digitnet_core::Model;
use digitnet_dataset::transform::PartialDataset;
use digitnet_dataset::vision::{
    preprocess, DigitItem, PreprocessConfig, SyntheticDigitsConfig, SyntheticDigitsDataset,
};
use digitnet_train::{
    Interrupter, Learner, ProgressSink, TrainingConfig, TrainingError, TrainingOutcome,
};
use serde::{Deserialize, Serialize};

use crate::inference::{predict, Prediction};
use crate::EngineError;

/// A training run requested by an outer surface.
#[derive(new, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingRequest {
    /// The synthetic samples to train and validate on.
    #[new(default)]
    pub data: SyntheticDigitsConfig,
    /// Fraction of the samples held out for validation, in `[0, 1)`.
    #[new(value = "0.2")]
    pub validation_split: f64,
    /// The training run.
    #[new(default)]
    pub training: TrainingConfig,
}

impl Default for TrainingRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for TrainingRequest {}

impl TrainingRequest {
    /// Sets the samples.
    pub fn with_data(mut self, data: SyntheticDigitsConfig) -> Self {
        self.data = data;
        self
    }

    /// Sets the fraction of samples held out for validation.
    pub fn with_validation_split(mut self, validation_split: f64) -> Self {
        self.validation_split = validation_split;
        self
    }

    /// Sets the training run.
    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    /// Number of training and validation samples.
    pub fn partition(&self) -> Result<(usize, usize), TrainingError> {
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(TrainingError::InvalidConfig(format!(
                "the validation split must be in [0, 1), got {}",
                self.validation_split
            )));
        }

        let num_samples = self.data.num_samples;
        let num_valid = (num_samples as f64 * self.validation_split).round() as usize;

        Ok((num_samples - num_valid, num_valid))
    }
}

/// Classifies a drawing with the default preprocessing.
///
/// The pixel buffer is row major with 1 to 4 interleaved channels. Nothing but the model
/// parameters is left in the arena afterwards.
pub fn submit_drawing(
    model: &Model,
    pixels: &[u8],
    width: usize,
    height: usize,
) -> Result<Prediction, EngineError> {
    submit_drawing_with(model, pixels, width, height, &PreprocessConfig::new())
}

/// Classifies a drawing with the given preprocessing.
///
/// The target size of the preprocessing follows the model input.
pub fn submit_drawing_with(
    model: &Model,
    pixels: &[u8],
    width: usize,
    height: usize,
    config: &PreprocessConfig,
) -> Result<Prediction, EngineError> {
    let config = match model.input_shape().dims.as_slice() {
        [rows, cols, 1] => config.clone().with_target_size([*rows, *cols]),
        _ => config.clone(),
    };

    let arena = model.arena();
    arena.run_scoped(|| {
        let input = preprocess(arena, pixels, width, height, &config)?;
        predict(model, &input)
    })
}

/// Trains the model on synthetic digits.
///
/// The sink receives one [progress](digitnet_train::TrainingProgress) snapshot per epoch. The
/// interrupter stops the run at the next batch boundary; the updates applied so far are kept.
pub fn request_training(
    model: &mut Model,
    request: &TrainingRequest,
    sink: &mut dyn ProgressSink,
    interrupter: &Interrupter,
) -> Result<TrainingOutcome, EngineError> {
    let (num_train, num_valid) = request.partition()?;
    let dataset = SyntheticDigitsDataset::new(request.data.clone());
    let dataset_train = PartialDataset::<_, DigitItem>::take(&dataset, num_train);
    let dataset_valid = PartialDataset::<_, DigitItem>::skip(&dataset, num_train);

    log::info!(
        "Training requested on {} samples, {} held out for validation",
        num_train,
        num_valid
    );

    let mut learner =
        Learner::new(request.training.clone()).with_interrupter(interrupter.clone());
    let outcome = learner.fit(model, &dataset_train, &dataset_valid, sink)?;

    Ok(outcome)
}
