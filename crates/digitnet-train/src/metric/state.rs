use super::MetricEntry;

/// Useful utility to implement numeric metrics.
///
/// # Notes
///
/// The values are weighted by the batch size, so the running value is the mean over items
/// rather than over batches.
#[derive(Debug, Default, Clone)]
pub struct NumericMetricState {
    sum: f64,
    count: usize,
    current: f64,
}

/// Formatting options for the [numeric metric state](NumericMetricState).
#[derive(new, Debug, Clone)]
pub struct FormatOptions {
    name: String,
    #[new(default)]
    unit: Option<String>,
    #[new(default)]
    precision: Option<usize>,
}

impl FormatOptions {
    /// Specify the metric unit.
    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    /// Specify the floating point precision.
    pub fn precision(mut self, precision: usize) -> Self {
        self.precision = Some(precision);
        self
    }
}

impl NumericMetricState {
    /// Create a new [numeric metric state](NumericMetricState).
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the state.
    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
        self.current = 0.0;
    }

    /// Update the state.
    pub fn update(&mut self, value: f64, batch_size: usize, format: FormatOptions) -> MetricEntry {
        self.sum += value * batch_size as f64;
        self.count += batch_size;
        self.current = value;

        let value_current = value;
        let value_running = self.running_value().unwrap_or(value);
        let serialized = value_current.to_string();

        let (formatted_current, formatted_running) = match format.precision {
            Some(precision) => (
                format!("{value_current:.precision$}"),
                format!("{value_running:.precision$}"),
            ),
            None => (format!("{value_current}"), format!("{value_running}")),
        };

        let formatted = match format.unit {
            Some(unit) => {
                format!("epoch {formatted_running} {unit} - batch {formatted_current} {unit}")
            }
            None => format!("epoch {formatted_running} - batch {formatted_current}"),
        };

        MetricEntry::new(format.name, formatted, serialized)
    }

    /// Value of the last update.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Mean of every update weighted by batch size, `None` before the first update.
    pub fn running_value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Number of items seen since the last reset.
    pub fn count(&self) -> usize {
        self.count
    }
}
