use super::state::{FormatOptions, NumericMetricState};
use super::{Metric, MetricEntry, Numeric};

/// The loss metric.
#[derive(Default)]
pub struct LossMetric {
    state: NumericMetricState,
}

/// The [loss metric](LossMetric) input type.
#[derive(new)]
pub struct LossInput {
    loss: f32,
    batch_size: usize,
}

impl LossMetric {
    /// Create the metric.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for LossMetric {
    const NAME: &'static str = "Loss";

    type Input = LossInput;

    fn update(&mut self, loss: &Self::Input) -> MetricEntry {
        self.state.update(
            loss.loss as f64,
            loss.batch_size,
            FormatOptions::new(Self::NAME.to_string()).precision(4),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl Numeric for LossMetric {
    fn value(&self) -> f64 {
        self.state.running_value().unwrap_or(0.0)
    }
}
