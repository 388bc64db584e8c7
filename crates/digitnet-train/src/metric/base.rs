use digitnet_core::BatchOutput;

/// Metric trait.
///
/// # Notes
///
/// Implementations should define their own input type only used by the metric.
pub trait Metric: Send + Sync {
    /// The name of the metric.
    const NAME: &'static str;

    /// The input type of the metric.
    type Input;

    /// Update the metric state and returns the current metric entry.
    fn update(&mut self, item: &Self::Input) -> MetricEntry;

    /// Clear the metric state.
    fn clear(&mut self);
}

/// Metric with a numeric value.
pub trait Numeric {
    /// Value of the metric over every update since the last clear.
    fn value(&self) -> f64;
}

/// Adaptor are used to transform types so that they can be used by metrics.
///
/// This should be implemented by a model's output type for all [metric inputs](Metric::Input) that
/// are registered with the learner.
pub trait Adaptor<T> {
    /// Adapt the type to be passed to a [metric](Metric).
    fn adapt(&self) -> T;
}

/// Data of a metric after an update.
#[derive(new, Debug, Clone, PartialEq)]
pub struct MetricEntry {
    /// The name of the metric.
    pub name: String,
    /// The string to be displayed.
    pub formatted: String,
    /// The string to be saved.
    pub serialize: String,
}

impl Adaptor<super::LossInput> for BatchOutput {
    fn adapt(&self) -> super::LossInput {
        super::LossInput::new(self.loss, self.batch_size)
    }
}

impl Adaptor<super::AccuracyInput> for BatchOutput {
    fn adapt(&self) -> super::AccuracyInput {
        super::AccuracyInput::new(self.correct, self.batch_size)
    }
}
