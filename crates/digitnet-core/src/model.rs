use core::fmt;

use digitnet_tensor::{Arena, Shape, Tensor, TensorCollection};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::nn::{
    Activation, Conv2dConfig, CrossEntropyLoss, DenseConfig, Layer, LayerSpec, MaxPool2dConfig,
};
use crate::optim::{Optimizer, OptimizerState};
use crate::{LearningRate, ModelError};

/// Configuration to build a sequential [model](Model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Shape of one input image.
    pub input_shape: Shape,
    /// Number of classes the model predicts.
    pub num_classes: usize,
    /// The layers, in order.
    pub layers: Vec<LayerSpec>,
    /// Seed of the parameter initialization.
    pub seed: u64,
}

impl Config for ModelConfig {}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::digits()
    }
}

impl ModelConfig {
    /// Creates a configuration with the given layers.
    pub fn new(input_shape: Shape, num_classes: usize, layers: Vec<LayerSpec>) -> Self {
        Self {
            input_shape,
            num_classes,
            layers,
            seed: 42,
        }
    }

    /// The digit classifier: two convolution and pooling stages followed by a softmax
    /// classifier over the 10 digits.
    pub fn digits() -> Self {
        Self::new(
            Shape::new([28, 28, 1]),
            10,
            vec![
                Conv2dConfig::new(8, [5, 5]).into(),
                MaxPool2dConfig::new([2, 2]).into(),
                Conv2dConfig::new(16, [5, 5]).into(),
                MaxPool2dConfig::new([2, 2]).into(),
                LayerSpec::Flatten,
                DenseConfig::new(10)
                    .with_activation(Activation::Softmax)
                    .into(),
            ],
        )
    }

    /// Set the seed of the parameter initialization.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Build the model, see [Model::build].
    pub fn init(&self, arena: &Arena) -> Result<Model, ModelError> {
        Model::build(self, arena)
    }
}

/// Loss and accuracy of a model on one batch.
#[derive(new, Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchOutput {
    /// Mean cross-entropy over the batch.
    pub loss: f32,
    /// Number of items whose most likely class is the labelled one.
    pub correct: usize,
    /// Number of items in the batch.
    pub batch_size: usize,
}

impl BatchOutput {
    /// Fraction of correctly classified items, 0 for an empty batch.
    pub fn accuracy(&self) -> f64 {
        match self.batch_size {
            0 => 0.0,
            size => self.correct as f64 / size as f64,
        }
    }
}

impl TensorCollection for BatchOutput {
    fn tensor_count(&self) -> usize {
        0
    }
}

/// A sequential classifier.
///
/// The model owns its parameters; [forward](Model::forward) only reads them while
/// [train_step](Model::train_step) replaces all of them at once after a successful step.
#[derive(Debug)]
pub struct Model {
    config: ModelConfig,
    layers: Vec<Box<dyn Layer>>,
    loss: CrossEntropyLoss,
    arena: Arena,
}

impl Model {
    /// Builds the layers of the configuration, checking that each one accepts the output shape
    /// of the previous one.
    ///
    /// The last layer must produce `[num_classes]` probabilities: a dense layer with a softmax
    /// activation or a softmax layer.
    pub fn build(config: &ModelConfig, arena: &Arena) -> Result<Self, ModelError> {
        if config.layers.is_empty() {
            return Err(ModelError::EmptyModel);
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut shape = config.input_shape.clone();
        let mut layers = Vec::with_capacity(config.layers.len());

        for (index, spec) in config.layers.iter().enumerate() {
            let layer = spec.init(index, &shape, arena, &mut rng)?;
            shape = layer.output_shape().clone();
            layers.push(layer);
        }

        let last = config.layers.len() - 1;
        let expected = Shape::new([config.num_classes]);

        if shape != expected {
            return Err(ModelError::ShapeMismatch {
                layer: last,
                kind: config.layers[last].kind(),
                expected: format!("an output of {expected}"),
                actual: shape,
            });
        }

        if !layers[last].outputs_probabilities() {
            return Err(ModelError::InvalidLayer {
                layer: last,
                kind: config.layers[last].kind(),
                reason: "the last layer must apply a softmax".to_string(),
            });
        }

        let model = Self {
            config: config.clone(),
            layers,
            loss: CrossEntropyLoss::default(),
            arena: arena.clone(),
        };

        log::info!(
            "Built model with {} layers and {} parameters",
            model.layers.len(),
            model.num_params()
        );

        Ok(model)
    }

    /// The configuration the model was built from.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// The arena the parameters and activations are allocated from.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Shape of one input image.
    pub fn input_shape(&self) -> &Shape {
        &self.config.input_shape
    }

    /// Number of classes.
    pub fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    /// The layers, in order.
    pub fn layers(&self) -> impl Iterator<Item = &dyn Layer> {
        self.layers.iter().map(|layer| layer.as_ref())
    }

    /// Number of learnable scalars.
    pub fn num_params(&self) -> usize {
        self.layers.iter().map(|layer| layer.num_params()).sum()
    }

    /// Applies the model to a batch `[N, H, W, C]`, returning `[N, num_classes]`
    /// probabilities.
    ///
    /// Intermediate activations are released before returning, also on error.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor, ModelError> {
        self.check_input(input)?;

        self.arena.run_scoped(|| {
            let mut layers = self.layers.iter();
            let mut output = match layers.next() {
                Some(layer) => layer.forward(input)?,
                None => return Err(ModelError::EmptyModel),
            };

            for layer in layers {
                output = layer.forward(&output)?;
            }

            Ok(output)
        })
    }

    /// Loss and accuracy on a labelled batch, without updating the parameters.
    pub fn evaluate(&self, input: &Tensor, targets: &Tensor) -> Result<BatchOutput, ModelError> {
        self.check_targets(input, targets)?;

        self.arena.run_scoped(|| {
            let probabilities = self.forward(input)?;
            self.batch_output(&probabilities, targets)
        })
    }

    /// Runs one optimization step on a labelled batch: forward pass, cross-entropy, backward
    /// pass and one optimizer update of every parameter.
    ///
    /// The parameters and the optimizer state are replaced only once every update was computed,
    /// so a failing step leaves both unchanged.
    pub fn train_step<O: Optimizer>(
        &mut self,
        input: &Tensor,
        targets: &Tensor,
        optim: &O,
        lr: LearningRate,
        state: &mut OptimizerState<O::State>,
    ) -> Result<BatchOutput, ModelError> {
        self.check_input(input)?;
        self.check_targets(input, targets)?;

        let (output, updates) = self.arena.run_scoped(|| {
            let activations = self.forward_all(input)?;
            let probabilities = activations.last().ok_or(ModelError::EmptyModel)?;
            let output = self.batch_output(probabilities, targets)?;

            let param_grads = self.backward(input, &activations, targets)?;
            let params = self.layers.iter().flat_map(|layer| layer.params());

            let mut updates = Vec::with_capacity(param_grads.len());
            for (index, (param, grad)) in params.zip(param_grads.iter()).enumerate() {
                updates.push(optim.step(lr, param.val(), grad, state.get(index))?);
            }

            Ok::<_, ModelError>((output, updates))
        })?;

        let mut states = Vec::with_capacity(updates.len());
        let params = self.layers.iter_mut().flat_map(|layer| layer.params_mut());

        for (param, (value, param_state)) in params.zip(updates) {
            param.set(value);
            states.push(param_state);
        }

        log::trace!(
            "Train step on {} items: loss {:.4}, {} correct",
            output.batch_size,
            output.loss,
            output.correct
        );

        *state = OptimizerState::from_states(states);

        Ok(output)
    }

    /// A summary of the layers and their parameters.
    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            input_shape: self.config.input_shape.clone(),
            num_classes: self.config.num_classes,
            layers: self
                .layers
                .iter()
                .map(|layer| LayerSummary {
                    kind: layer.kind().to_string(),
                    output_shape: layer.output_shape().clone(),
                    num_params: layer.num_params(),
                })
                .collect(),
            num_params: self.num_params(),
        }
    }

    /// Forward pass keeping the output of every layer.
    fn forward_all(&self, input: &Tensor) -> Result<Vec<Tensor>, ModelError> {
        let mut activations: Vec<Tensor> = Vec::with_capacity(self.layers.len());

        for layer in &self.layers {
            let output = match activations.last() {
                Some(previous) => layer.forward(previous)?,
                None => layer.forward(input)?,
            };
            activations.push(output);
        }

        Ok(activations)
    }

    /// Gradients of every parameter, in the order of the layers.
    fn backward(
        &self,
        input: &Tensor,
        activations: &[Tensor],
        targets: &Tensor,
    ) -> Result<Vec<Tensor>, ModelError> {
        let probabilities = activations.last().ok_or(ModelError::EmptyModel)?;
        let mut grad = self.loss.backward(probabilities, targets)?;
        let mut param_grads = Vec::new();

        for (index, layer) in self.layers.iter().enumerate().rev() {
            let layer_input = match index {
                0 => input,
                _ => &activations[index - 1],
            };
            let grads = layer.backward(layer_input, &activations[index], &grad)?;

            grad = grads.input;
            param_grads.push(grads.params);
        }

        Ok(param_grads.into_iter().rev().flatten().collect())
    }

    fn batch_output(
        &self,
        probabilities: &Tensor,
        targets: &Tensor,
    ) -> Result<BatchOutput, ModelError> {
        let loss = self.loss.forward(probabilities, targets)?;
        let predicted = probabilities.argmax_rows()?;
        let expected = targets.argmax_rows()?;
        let correct = predicted
            .iter()
            .zip(&expected)
            .filter(|(predicted, expected)| predicted == expected)
            .count();

        Ok(BatchOutput::new(loss, correct, predicted.len()))
    }

    fn check_input(&self, input: &Tensor) -> Result<(), ModelError> {
        let batch_size = input.shape().batch_size();

        if input.rank() == 0 || input.shape() != &self.config.input_shape.batched(batch_size) {
            return Err(ModelError::InvalidBatch {
                expected: self.config.input_shape.clone(),
                actual: input.shape().clone(),
            });
        }

        Ok(())
    }

    fn check_targets(&self, input: &Tensor, targets: &Tensor) -> Result<(), ModelError> {
        let expected = Shape::new([input.shape().batch_size(), self.config.num_classes]);

        if targets.shape() != &expected {
            return Err(ModelError::InvalidBatch {
                expected: Shape::new([self.config.num_classes]),
                actual: targets.shape().clone(),
            });
        }

        Ok(())
    }
}

/// Description of one layer in a [model summary](ModelSummary).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    /// Kind of layer.
    pub kind: String,
    /// Shape of one output item.
    pub output_shape: Shape,
    /// Number of learnable scalars.
    pub num_params: usize,
}

/// Description of a model: its layers, shapes and parameter counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    /// Shape of one input image.
    pub input_shape: Shape,
    /// Number of classes.
    pub num_classes: usize,
    /// The layers, in order.
    pub layers: Vec<LayerSummary>,
    /// Total number of learnable scalars.
    pub num_params: usize,
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<4} {:<12} {:<16} {:>10}", "#", "Layer", "Output", "Params")?;
        writeln!(f, "{:<4} {:<12} {:<16} {:>10}", "", "input", self.input_shape.to_string(), "")?;

        for (index, layer) in self.layers.iter().enumerate() {
            writeln!(
                f,
                "{:<4} {:<12} {:<16} {:>10}",
                index,
                layer.kind,
                layer.output_shape.to_string(),
                layer.num_params
            )?;
        }

        write!(
            f,
            "Total: {} parameters, {} classes",
            self.num_params, self.num_classes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::Initializer;
    use crate::optim::{AdamConfig, SgdConfig};

    fn small_config() -> ModelConfig {
        ModelConfig::new(
            Shape::new([6, 6, 1]),
            3,
            vec![
                Conv2dConfig::new(2, [3, 3]).into(),
                MaxPool2dConfig::new([2, 2]).into(),
                LayerSpec::Flatten,
                DenseConfig::new(3)
                    .with_activation(Activation::Softmax)
                    .into(),
            ],
        )
    }

    fn batch(arena: &Arena) -> (Tensor, Tensor) {
        let input = Tensor::from_fn(arena, [4, 6, 6, 1], |i| ((i * 13) % 17) as f32 / 17.0)
            .unwrap();
        let targets = Tensor::from_floats(
            arena,
            [4, 3],
            &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0],
        )
        .unwrap();

        (input, targets)
    }

    #[test]
    fn digits_model_maps_images_to_class_probabilities() {
        let arena = Arena::new();
        let model = ModelConfig::digits().init(&arena).unwrap();
        let input = Tensor::zeros(&arena, [3, 28, 28, 1]).unwrap();

        let output = model.forward(&input).unwrap();

        assert_eq!(output.dims(), &[3, 10]);
        for row in output.as_slice().chunks(10) {
            approx::assert_abs_diff_eq!(row.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn forward_releases_its_intermediates() {
        let arena = Arena::new();
        let model = small_config().init(&arena).unwrap();
        let (input, _targets) = batch(&arena);
        let before = arena.live_tensors();

        let output = model.forward(&input).unwrap();

        assert_eq!(arena.live_tensors(), before + 1);
        drop(output);
        assert_eq!(arena.live_tensors(), before);
    }

    #[test]
    fn missing_flatten_is_a_shape_mismatch() {
        let arena = Arena::new();
        let config = ModelConfig::new(
            Shape::new([28, 28, 1]),
            10,
            vec![
                Conv2dConfig::new(4, [3, 3]).into(),
                DenseConfig::new(10)
                    .with_activation(Activation::Softmax)
                    .into(),
            ],
        );

        let result = config.init(&arena);

        assert_eq!(
            result.unwrap_err(),
            ModelError::ShapeMismatch {
                layer: 1,
                kind: "dense",
                expected: "[features], flatten images first".to_string(),
                actual: Shape::new([26, 26, 4]),
            }
        );
        assert_eq!(arena.live_tensors(), 0);
    }

    #[test]
    fn wrong_number_of_classes_is_a_shape_mismatch() {
        let arena = Arena::new();
        let config = ModelConfig::new(
            Shape::new([28, 28, 1]),
            10,
            vec![
                LayerSpec::Flatten,
                DenseConfig::new(12)
                    .with_activation(Activation::Softmax)
                    .into(),
            ],
        );

        assert!(matches!(
            config.init(&arena),
            Err(ModelError::ShapeMismatch { layer: 1, .. })
        ));
    }

    #[test]
    fn last_layer_must_apply_softmax() {
        let arena = Arena::new();
        let config = ModelConfig::new(
            Shape::new([4]),
            2,
            vec![DenseConfig::new(2).into()],
        );

        assert!(matches!(
            config.init(&arena),
            Err(ModelError::InvalidLayer { layer: 0, .. })
        ));

        let config = ModelConfig::new(
            Shape::new([4]),
            2,
            vec![DenseConfig::new(2).into(), LayerSpec::Softmax],
        );
        assert!(config.init(&arena).is_ok());
    }

    #[test]
    fn empty_model_is_refused() {
        let arena = Arena::new();
        let config = ModelConfig::new(Shape::new([4]), 2, Vec::new());

        assert_eq!(config.init(&arena).unwrap_err(), ModelError::EmptyModel);
    }

    #[test]
    fn wrong_input_shape_is_refused() {
        let arena = Arena::new();
        let model = small_config().init(&arena).unwrap();
        let input = Tensor::zeros(&arena, [2, 5, 5, 1]).unwrap();

        assert!(matches!(
            model.forward(&input),
            Err(ModelError::InvalidBatch { .. })
        ));
    }

    #[test]
    fn same_seed_same_parameters() {
        let arena = Arena::new();
        let a = small_config().init(&arena).unwrap();
        let b = small_config().init(&arena).unwrap();
        let (input, _targets) = batch(&arena);

        assert_eq!(a.forward(&input).unwrap(), b.forward(&input).unwrap());
    }

    #[test]
    fn train_steps_reduce_the_loss() {
        let arena = Arena::new();
        let mut model = small_config().init(&arena).unwrap();
        let (input, targets) = batch(&arena);
        let optim = AdamConfig::new().init();
        let mut state = OptimizerState::new();

        let initial = model.evaluate(&input, &targets).unwrap();
        for _ in 0..50 {
            model
                .train_step(&input, &targets, &optim, 0.01, &mut state)
                .unwrap();
        }
        let last = model.evaluate(&input, &targets).unwrap();

        assert!(last.loss < initial.loss);
        assert_eq!(state.len(), 4);
    }

    #[test]
    fn train_step_keeps_memory_bounded() {
        let arena = Arena::new();
        let mut model = small_config().init(&arena).unwrap();
        let (input, targets) = batch(&arena);
        let optim = AdamConfig::new().init();

        let mut state = OptimizerState::new();

        model
            .train_step(&input, &targets, &optim, 1e-3, &mut state)
            .unwrap();
        let live = arena.live_tensors();

        model
            .train_step(&input, &targets, &optim, 1e-3, &mut state)
            .unwrap();

        assert_eq!(arena.live_tensors(), live);
    }

    #[test]
    fn failing_step_leaves_the_parameters_untouched() {
        let arena = Arena::new();
        let mut model = small_config().init(&arena).unwrap();
        let (input, _targets) = batch(&arena);
        let bad_targets = Tensor::zeros(&arena, [4, 2]).unwrap();
        let before = model.forward(&input).unwrap();

        let result = model.train_step(
            &input,
            &bad_targets,
            &SgdConfig::new().init(),
            0.1,
            &mut OptimizerState::new(),
        );

        assert!(matches!(result, Err(ModelError::InvalidBatch { .. })));
        assert_eq!(model.forward(&input).unwrap(), before);
    }

    #[test]
    fn failing_step_keeps_the_optimizer_state() {
        let arena = Arena::new();
        let mut model = small_config().init(&arena).unwrap();
        let (input, targets) = batch(&arena);
        let bad_targets = Tensor::zeros(&arena, [4, 2]).unwrap();
        let optim = AdamConfig::new().init();
        let mut state = OptimizerState::new();
        model
            .train_step(&input, &targets, &optim, 1e-3, &mut state)
            .unwrap();
        let live = arena.live_tensors();

        let result = model.train_step(&input, &bad_targets, &optim, 1e-3, &mut state);

        assert!(result.is_err());
        assert_eq!(state.len(), 4);
        assert_eq!(arena.live_tensors(), live);
    }

    #[test]
    fn gradients_match_finite_differences() {
        let arena = Arena::new();
        let config = ModelConfig::new(
            Shape::new([4, 4, 1]),
            3,
            vec![
                Conv2dConfig::new(2, [3, 3])
                    .with_initializer(Initializer::Uniform(-0.5, 0.5))
                    .into(),
                LayerSpec::Flatten,
                DenseConfig::new(3)
                    .with_activation(Activation::Softmax)
                    .with_initializer(Initializer::Uniform(-0.5, 0.5))
                    .into(),
            ],
        );
        let model = config.init(&arena).unwrap();
        let input = Tensor::from_fn(&arena, [2, 4, 4, 1], |i| (i % 5) as f32 / 5.0).unwrap();
        let targets = Tensor::from_floats(&arena, [2, 3], &[0.0, 1.0, 0.0, 0.0, 0.0, 1.0]).unwrap();

        let activations = model.forward_all(&input).unwrap();
        let grads = model.backward(&input, &activations, &targets).unwrap();

        // Perturb the first dense weight and compare.
        let dense_weight = model.layers[2].params()[0].val();
        let epsilon = 1e-2;
        let loss_with = |delta: f32| {
            let mut data = dense_weight.to_vec();
            data[0] += delta;
            let mut perturbed = config.init(&arena).unwrap();
            let weight = Tensor::from_vec(&arena, dense_weight.shape(), data).unwrap();
            perturbed.layers[2].params_mut()[0].set(weight);
            perturbed.evaluate(&input, &targets).unwrap().loss as f64
        };
        let numeric = (loss_with(epsilon) - loss_with(-epsilon)) / (2.0 * epsilon as f64);

        // Conv weight, conv bias, dense weight, dense bias.
        assert_eq!(grads.len(), 4);
        approx::assert_abs_diff_eq!(grads[2].as_slice()[0] as f64, numeric, epsilon = 1e-3);
    }

    #[test]
    fn summary_lists_every_layer() {
        let arena = Arena::new();
        let model = ModelConfig::digits().init(&arena).unwrap();

        let summary = model.summary();

        assert_eq!(summary.layers.len(), 6);
        assert_eq!(summary.layers[5].output_shape, Shape::new([10]));
        assert_eq!(
            summary.num_params,
            (5 * 5 * 8 + 8) + (5 * 5 * 8 * 16 + 16) + (4 * 4 * 16 * 10 + 10)
        );
        assert!(summary.to_string().contains("Total: 5994 parameters, 10 classes"));
    }

    #[test]
    fn config_is_saved_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let config = ModelConfig::digits().with_seed(7);

        config.save(&path).unwrap();

        assert_eq!(ModelConfig::load(&path).unwrap(), config);
    }
}
