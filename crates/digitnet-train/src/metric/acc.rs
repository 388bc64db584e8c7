use super::state::{FormatOptions, NumericMetricState};
use super::{Metric, MetricEntry, Numeric};

/// The accuracy metric, as a fraction of the items in `[0, 1]`.
#[derive(Default)]
pub struct AccuracyMetric {
    state: NumericMetricState,
}

/// The [accuracy metric](AccuracyMetric) input type.
#[derive(new)]
pub struct AccuracyInput {
    correct: usize,
    batch_size: usize,
}

impl AccuracyMetric {
    /// Creates the metric.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for AccuracyMetric {
    const NAME: &'static str = "Accuracy";

    type Input = AccuracyInput;

    fn update(&mut self, input: &AccuracyInput) -> MetricEntry {
        let accuracy = match input.batch_size {
            0 => 0.0,
            batch_size => input.correct as f64 / batch_size as f64,
        };

        self.state.update(
            accuracy,
            input.batch_size,
            FormatOptions::new(Self::NAME.to_string()).precision(4),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl Numeric for AccuracyMetric {
    fn value(&self) -> f64 {
        self.state.running_value().unwrap_or(0.0)
    }
}
