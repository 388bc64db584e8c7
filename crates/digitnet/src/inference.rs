use core::fmt;

use digitnet_core::{Model, ModelError};
use digitnet_tensor::{Tensor, TensorCollection};
use serde::Serialize;

use crate::EngineError;

const HIGH_CERTAINTY: f32 = 0.8;
const MEDIUM_CERTAINTY: f32 = 0.5;

/// How sure the model is of its top class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Certainty {
    /// Top confidence of at least 80%.
    High,
    /// Top confidence of at least 50%.
    Medium,
    /// Anything below.
    Low,
}

impl Certainty {
    /// Certainty level of a top confidence.
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= HIGH_CERTAINTY {
            Certainty::High
        } else if confidence >= MEDIUM_CERTAINTY {
            Certainty::Medium
        } else {
            Certainty::Low
        }
    }
}

/// A class of a [prediction](Prediction) with its place in the ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedClass {
    /// The class index.
    pub class: usize,
    /// The digit as text.
    pub label: String,
    /// Probability of the class.
    pub probability: f32,
    /// Position in the ranking, starting at 1.
    pub rank: usize,
}

impl RankedClass {
    /// The probability as a percentage with two decimals, e.g. `93.12%`.
    pub fn confidence_percent(&self) -> String {
        format!("{:.2}%", self.probability * 100.0)
    }
}

/// Statistics over the top classes of a prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceSummary {
    /// Highest probability.
    pub top: f32,
    /// Lowest probability among the classes considered.
    pub lowest: f32,
    /// Difference between the two.
    pub spread: f32,
    /// Mean probability of the classes considered.
    pub average: f32,
    /// Certainty level of the top probability.
    pub certainty: Certainty,
}

/// The class predicted for a sample and the ranked distribution it was picked from.
///
/// Probabilities are non-negative and sum to one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    class: usize,
    confidence: f32,
    ranked: Vec<RankedClass>,
    probabilities: Vec<f32>,
}

impl Prediction {
    /// Builds a prediction from the output of the model.
    ///
    /// The output is normalized. An output with a non-finite or negative entry, or that sums to
    /// zero, is replaced by the uniform distribution. Returns `None` for an empty output.
    pub fn from_probabilities(output: &[f32]) -> Option<Self> {
        if output.is_empty() {
            return None;
        }

        let probabilities = normalize(output);

        let mut ranked = probabilities
            .iter()
            .enumerate()
            .map(|(class, probability)| RankedClass {
                class,
                label: class.to_string(),
                probability: *probability,
                rank: 0,
            })
            .collect::<Vec<_>>();
        // Stable: equal probabilities keep the class order.
        ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        for (index, entry) in ranked.iter_mut().enumerate() {
            entry.rank = index + 1;
        }

        let top = &ranked[0];

        Some(Self {
            class: top.class,
            confidence: top.probability,
            ranked,
            probabilities,
        })
    }

    /// The predicted class.
    pub fn class(&self) -> usize {
        self.class
    }

    /// Probability of the predicted class.
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Every class, most likely first.
    pub fn ranked(&self) -> &[RankedClass] {
        &self.ranked
    }

    /// The `k` most likely classes.
    pub fn top_k(&self, k: usize) -> &[RankedClass] {
        &self.ranked[..k.min(self.ranked.len())]
    }

    /// Probability of a class, `None` when the class does not exist.
    pub fn probability(&self, class: usize) -> Option<f32> {
        self.probabilities.get(class).copied()
    }

    /// Probabilities indexed by class.
    pub fn probabilities(&self) -> &[f32] {
        &self.probabilities
    }

    /// Certainty level of the prediction.
    pub fn certainty(&self) -> Certainty {
        Certainty::from_confidence(self.confidence)
    }

    /// Statistics over the `k` most likely classes, at least one.
    pub fn summary(&self, k: usize) -> ConfidenceSummary {
        let top_k = self.top_k(k.max(1));
        let top = self.confidence;
        let lowest = top_k
            .iter()
            .map(|entry| entry.probability)
            .fold(top, f32::min);
        let average =
            top_k.iter().map(|entry| entry.probability).sum::<f32>() / top_k.len() as f32;

        ConfidenceSummary {
            top,
            lowest,
            spread: top - lowest,
            average,
            certainty: self.certainty(),
        }
    }
}

impl TensorCollection for Prediction {
    fn tensor_count(&self) -> usize {
        0
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2}%)", self.class, self.confidence * 100.0)
    }
}

/// Classifies one sample.
///
/// The sample is an image of the model input shape, with or without a leading batch dimension of
/// one. Runs a forward pass only, the activations are released before returning.
pub fn predict(model: &Model, sample: &Tensor) -> Result<Prediction, EngineError> {
    let input_shape = model.input_shape();
    let batched_shape = input_shape.batched(1);

    let output = model.arena().run_scoped(|| {
        let output = if sample.shape() == input_shape {
            let batch = sample.reshape(batched_shape.clone())?;
            model.forward(&batch)?
        } else if sample.shape() == &batched_shape {
            model.forward(sample)?
        } else {
            return Err(ModelError::InvalidBatch {
                expected: input_shape.clone(),
                actual: sample.shape().clone(),
            }
            .into());
        };

        Ok::<_, EngineError>(output.into_vec())
    })?;

    let prediction = Prediction::from_probabilities(&output).ok_or_else(|| {
        EngineError::InvalidOutput(format!("no class in an output of {} values", output.len()))
    })?;

    log::debug!("Predicted {prediction}");

    Ok(prediction)
}

fn normalize(output: &[f32]) -> Vec<f32> {
    let valid = output.iter().all(|value| value.is_finite() && *value >= 0.0);
    let sum = output.iter().map(|value| *value as f64).sum::<f64>();

    if !valid || sum <= 0.0 || !sum.is_finite() {
        log::warn!("Model output {output:?} is not a distribution, predicting uniformly");
        return vec![1.0 / output.len() as f32; output.len()];
    }

    output
        .iter()
        .map(|value| (*value as f64 / sum) as f32)
        .collect()
}
