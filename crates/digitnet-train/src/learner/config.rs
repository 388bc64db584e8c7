use digitnet_core::config::Config;
use digitnet_core::optim::AdamConfig;
use digitnet_core::LearningRate;
use serde::{Deserialize, Serialize};

use crate::TrainingError;

/// Configuration of a training run.
#[derive(new, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of passes over the training data.
    #[new(value = "10")]
    pub num_epochs: usize,
    /// Number of items per training step.
    #[new(value = "64")]
    pub batch_size: usize,
    /// Whether the training items are shuffled at the start of each epoch.
    #[new(value = "true")]
    pub shuffle: bool,
    /// Seed of the shuffling.
    #[new(value = "42")]
    pub seed: u64,
    /// Learning rate of the optimizer.
    #[new(value = "1e-3")]
    pub learning_rate: LearningRate,
    /// The optimizer.
    #[new(default)]
    pub optimizer: AdamConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for TrainingConfig {}

impl TrainingConfig {
    /// Sets the number of epochs.
    pub fn with_num_epochs(mut self, num_epochs: usize) -> Self {
        self.num_epochs = num_epochs;
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets whether training items are shuffled.
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Sets the shuffling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the learning rate.
    pub fn with_learning_rate(mut self, learning_rate: LearningRate) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the optimizer.
    pub fn with_optimizer(mut self, optimizer: AdamConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Checks that the configuration can drive a training run.
    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidConfig(
                "the batch size must be at least 1".to_string(),
            ));
        }

        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainingError::InvalidConfig(format!(
                "the learning rate must be positive, got {}",
                self.learning_rate
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults() {
        let config = TrainingConfig::new();

        assert_eq!(config.num_epochs, 10);
        assert_eq!(config.batch_size, 64);
        assert!(config.shuffle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_refused() {
        let config = TrainingConfig::new().with_batch_size(0);

        assert!(matches!(
            config.validate(),
            Err(TrainingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn negative_learning_rate_is_refused() {
        let config = TrainingConfig::new().with_learning_rate(-0.1);

        assert!(config.validate().is_err());
    }

    #[test]
    fn config_is_saved_and_loaded() {
        let file = NamedTempFile::new().unwrap();
        let config = TrainingConfig::new().with_num_epochs(3).with_shuffle(false);

        config.save(file.path()).unwrap();
        let loaded = TrainingConfig::load(file.path()).unwrap();

        assert_eq!(config, loaded);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: TrainingConfig = serde_json::from_str(r#"{"batch_size": 8}"#).unwrap();

        assert_eq!(config.batch_size, 8);
        assert_eq!(config.num_epochs, 10);
        assert_eq!(config.optimizer, AdamConfig::new());
    }
}
