use digitnet_tensor::{Result, Tensor, TensorError};

/// Categorical cross-entropy between predicted probabilities and one-hot targets.
///
/// Probabilities are clamped to `[epsilon, 1]` before taking their logarithm so a confident
/// wrong prediction gives a large but finite loss.
#[derive(new, Debug, Clone, Copy, PartialEq)]
pub struct CrossEntropyLoss {
    epsilon: f32,
}

impl Default for CrossEntropyLoss {
    fn default() -> Self {
        Self::new(1e-7)
    }
}

impl CrossEntropyLoss {
    /// Mean over the batch of `-sum(targets * ln(probabilities))`.
    ///
    /// # Shapes
    ///
    /// - probabilities: `[batch_size, num_classes]`
    /// - targets: `[batch_size, num_classes]`
    pub fn forward(&self, probabilities: &Tensor, targets: &Tensor) -> Result<f32> {
        probabilities.check_same_shape(targets, "cross_entropy")?;
        let [batch_size, _] = dims(probabilities)?;

        let total: f64 = probabilities
            .as_slice()
            .iter()
            .zip(targets.as_slice())
            .filter(|(_, target)| **target != 0.0)
            .map(|(prob, target)| -(*target as f64) * (prob.max(self.epsilon) as f64).ln())
            .sum();

        Ok((total / batch_size.max(1) as f64) as f32)
    }

    /// Gradient of [forward](Self::forward) with respect to the probabilities.
    pub fn backward(&self, probabilities: &Tensor, targets: &Tensor) -> Result<Tensor> {
        let [batch_size, _] = dims(probabilities)?;
        let scale = batch_size.max(1) as f32;

        probabilities.zip_map(targets, "cross_entropy_backward", |prob, target| {
            -target / (prob.max(self.epsilon) * scale)
        })
    }
}

fn dims(probabilities: &Tensor) -> Result<[usize; 2]> {
    match probabilities.dims() {
        [batch_size, classes] => Ok([*batch_size, *classes]),
        _ => Err(TensorError::InvalidRank {
            op: "cross_entropy",
            expected: 2,
            actual: probabilities.shape().clone(),
        }),
    }
}
