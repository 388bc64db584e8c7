use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use digitnet_core::optim::{Adam, Optimizer, OptimizerState};
use digitnet_core::Model;
use digitnet_dataset::transform::ShuffledDataset;
use digitnet_dataset::vision::DigitItem;
use digitnet_dataset::Dataset;

use super::epoch::{EpochSummary, TrainEpoch, ValidEpoch};
use crate::{
    install_file_logger, ProgressSink, SampleBatcher, TrainerState, TrainingConfig, TrainingError,
    TrainingProgress,
};

/// How a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingOutcome {
    /// Every requested epoch ran.
    Completed {
        /// Number of epochs run.
        epochs: usize,
    },
    /// The run was interrupted; the updates applied before are kept.
    Aborted {
        /// The epoch that was cut short.
        epoch: usize,
    },
}

impl TrainingOutcome {
    /// Whether the run was interrupted.
    pub fn is_aborted(&self) -> bool {
        matches!(self, TrainingOutcome::Aborted { .. })
    }
}

/// Learner struct encapsulating all components necessary to train a model.
///
/// The model is borrowed for the duration of a run only, the learner keeps the optimizer state
/// between runs.
pub struct Learner<O: Optimizer = Adam> {
    config: TrainingConfig,
    optim: O,
    optim_state: OptimizerState<O::State>,
    interrupter: Interrupter,
    state: TrainerState,
}

impl Learner<Adam> {
    /// Creates a learner with the Adam optimizer of the configuration.
    pub fn new(config: TrainingConfig) -> Self {
        let optim = config.optimizer.init();
        Self::with_optimizer(config, optim)
    }
}

impl<O: Optimizer> Learner<O> {
    /// Creates a learner with another optimizer.
    pub fn with_optimizer(config: TrainingConfig, optim: O) -> Self {
        Self {
            config,
            optim,
            optim_state: OptimizerState::new(),
            interrupter: Interrupter::new(),
            state: TrainerState::Uninitialized,
        }
    }

    /// Uses an interrupter shared with the caller.
    pub fn with_interrupter(mut self, interrupter: Interrupter) -> Self {
        self.interrupter = interrupter;
        self
    }

    /// Logs to a file, unless a global subscriber is already installed.
    pub fn with_file_logger<P: AsRef<Path>>(self, file_path: P) -> Self {
        install_file_logger(file_path);
        self
    }

    /// A handle to stop the training from another thread or from a [progress sink](ProgressSink).
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// The training configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// The current state of the learner.
    pub fn state(&self) -> TrainerState {
        self.state
    }

    /// The optimizer state of the model parameters.
    pub fn optimizer_state(&self) -> &OptimizerState<O::State> {
        &self.optim_state
    }

    /// Trains the model.
    ///
    /// Each epoch runs a training step per batch, shuffled when configured, then a forward-only
    /// pass over the validation items, and reports a [progress](TrainingProgress) snapshot to the
    /// sink.
    ///
    /// # Returns
    ///
    /// [Aborted](TrainingOutcome::Aborted) when the interrupter stopped the run. The epoch in
    /// progress is still reported, without validation. Any error aborts the run and leaves the
    /// learner ready to train again.
    pub fn fit<DT, DV>(
        &mut self,
        model: &mut Model,
        dataset_train: &DT,
        dataset_valid: &DV,
        sink: &mut dyn ProgressSink,
    ) -> Result<TrainingOutcome, TrainingError>
    where
        DT: Dataset<DigitItem>,
        DV: Dataset<DigitItem>,
    {
        self.config.validate()?;
        if dataset_train.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }

        log::info!(
            "Fitting a model of {} parameters on {} items, validating on {}",
            model.num_params(),
            dataset_train.len(),
            dataset_valid.len()
        );

        if self.state != TrainerState::Trained {
            self.transition(TrainerState::DataLoading)?;
            log::info!(
                "{} training batches of at most {} items per epoch",
                dataset_train.len().div_ceil(self.config.batch_size),
                self.config.batch_size
            );
            self.transition(TrainerState::ReadyToTrain)?;
        }
        self.transition(TrainerState::Training)?;

        let batcher = SampleBatcher::new(model.input_shape().clone(), model.num_classes());

        match self.run_epochs(model, &batcher, dataset_train, dataset_valid, sink) {
            Ok(outcome @ TrainingOutcome::Completed { .. }) => {
                self.transition(TrainerState::Trained)?;
                Ok(outcome)
            }
            Ok(outcome @ TrainingOutcome::Aborted { .. }) => {
                self.transition(TrainerState::ReadyToTrain)?;
                Ok(outcome)
            }
            Err(err) => {
                log::error!("Training failed: {err}");
                self.transition(TrainerState::ReadyToTrain)?;
                Err(err)
            }
        }
    }

    fn run_epochs<DT, DV>(
        &mut self,
        model: &mut Model,
        batcher: &SampleBatcher,
        dataset_train: &DT,
        dataset_valid: &DV,
        sink: &mut dyn ProgressSink,
    ) -> Result<TrainingOutcome, TrainingError>
    where
        DT: Dataset<DigitItem>,
        DV: Dataset<DigitItem>,
    {
        let num_epochs = self.config.num_epochs;
        let batch_size = self.config.batch_size;
        let mut previous: Option<EpochSummary> = None;

        for epoch in 1..=num_epochs {
            let train_epoch = TrainEpoch::new(
                batcher,
                &self.optim,
                self.config.learning_rate,
                &self.interrupter,
                epoch,
                num_epochs,
                batch_size,
            );

            let mut train = if self.config.shuffle {
                let seed = self.config.seed.wrapping_add(epoch as u64);
                let shuffled = ShuffledDataset::<_, DigitItem>::with_seed(dataset_train, seed);
                train_epoch.run(model, &mut self.optim_state, &shuffled, sink)?
            } else {
                train_epoch.run(model, &mut self.optim_state, dataset_train, sink)?
            };

            if train.iterations == 0 {
                if let Some(previous) = &previous {
                    train.loss = previous.loss;
                    train.accuracy = previous.accuracy;
                }
            }

            if train.interrupted {
                log::info!("Training interrupted during epoch {epoch}");
                sink.on_epoch_end(epoch_progress(epoch, num_epochs, &train, None));
                return Ok(TrainingOutcome::Aborted { epoch });
            }

            let valid = ValidEpoch::new(batcher, epoch, batch_size).run(model, dataset_valid)?;
            let progress = epoch_progress(epoch, num_epochs, &train, Some(&valid));

            log::info!(
                "Epoch {epoch}/{num_epochs}: loss {:.4}, accuracy {:.4}, validation accuracy {}",
                progress.loss,
                progress.accuracy,
                progress
                    .validation_accuracy
                    .map_or("n/a".to_string(), |accuracy| format!("{accuracy:.4}"))
            );
            sink.on_epoch_end(progress);
            previous = Some(train);
        }

        Ok(TrainingOutcome::Completed { epochs: num_epochs })
    }

    fn transition(&mut self, next: TrainerState) -> Result<(), TrainingError> {
        if !self.state.can_transition_to(next) {
            return Err(TrainingError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        log::debug!("Learner state {:?} -> {:?}", self.state, next);
        self.state = next;

        Ok(())
    }
}

fn epoch_progress(
    epoch: usize,
    total_epochs: usize,
    train: &EpochSummary,
    valid: Option<&EpochSummary>,
) -> TrainingProgress {
    let validated = valid.filter(|valid| valid.iterations > 0);

    TrainingProgress {
        epoch,
        total_epochs,
        loss: train.loss,
        accuracy: train.accuracy,
        validation_accuracy: validated.map(|valid| valid.accuracy),
        validation_loss: validated.map(|valid| valid.loss),
        skipped_samples: train.skipped + valid.map_or(0, |valid| valid.skipped),
        iterations: train.iterations,
        aborted: train.interrupted,
    }
}

/// Lets the learner stop at the next batch boundary.
#[derive(Clone, Default, Debug)]
pub struct Interrupter {
    state: Arc<AtomicBool>,
}

impl Interrupter {
    /// Create a new instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notify the learner that it should stop.
    pub fn stop(&self) {
        self.state.store(true, Ordering::Relaxed);
    }

    /// Reset the interrupter.
    pub fn reset(&self) {
        self.state.store(false, Ordering::Relaxed);
    }

    /// True if .stop() has been called.
    pub fn should_stop(&self) -> bool {
        self.state.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{digits, small_model};
    use crate::{BatchProgress, NoProgress};
    use digitnet_core::optim::SgdConfig;
    use digitnet_dataset::transform::PartialDataset;
    use digitnet_dataset::InMemDataset;
    use digitnet_tensor::Arena;

    fn config() -> TrainingConfig {
        TrainingConfig::new()
            .with_num_epochs(2)
            .with_batch_size(16)
            .with_learning_rate(0.01)
    }

    struct Recorder {
        epochs: Vec<TrainingProgress>,
        batches: usize,
        stop_at: Option<(usize, usize)>,
        stop_after_epoch: Option<usize>,
        interrupter: Interrupter,
    }

    impl Recorder {
        fn new(interrupter: Interrupter) -> Self {
            Self {
                epochs: Vec::new(),
                batches: 0,
                stop_at: None,
                stop_after_epoch: None,
                interrupter,
            }
        }
    }

    impl ProgressSink for Recorder {
        fn on_batch_end(&mut self, progress: BatchProgress) {
            self.batches += 1;
            if self.stop_at == Some((progress.epoch, progress.iteration)) {
                self.interrupter.stop();
            }
        }

        fn on_epoch_end(&mut self, progress: TrainingProgress) {
            if self.stop_after_epoch == Some(progress.epoch) {
                self.interrupter.stop();
            }
            self.epochs.push(progress);
        }
    }

    #[test]
    fn one_progress_per_epoch() {
        let arena = Arena::new();
        let mut model = small_model(&arena);
        let dataset = digits(60);
        let train = PartialDataset::take(&dataset, 48);
        let valid = PartialDataset::skip(&dataset, 48);
        let mut learner = Learner::new(config());
        let mut recorder = Recorder::new(learner.interrupter());

        let outcome = learner
            .fit(&mut model, &train, &valid, &mut recorder)
            .unwrap();

        assert_eq!(outcome, TrainingOutcome::Completed { epochs: 2 });
        assert_eq!(learner.state(), TrainerState::Trained);
        assert_eq!(recorder.batches, 6);
        assert_eq!(
            recorder.epochs.iter().map(|p| p.epoch).collect::<Vec<_>>(),
            vec![1, 2]
        );
        for progress in recorder.epochs.iter() {
            assert_eq!(progress.total_epochs, 2);
            assert_eq!(progress.iterations, 3);
            assert!(!progress.aborted);
            assert!(progress.loss.is_finite());
            assert!((0.0..=1.0).contains(&progress.accuracy));
            assert!(progress.validation_accuracy.is_some());
        }
    }

    #[test]
    fn interruption_reports_the_partial_epoch() {
        let arena = Arena::new();
        let mut model = small_model(&arena);
        let dataset = digits(64);
        let mut learner = Learner::new(config().with_num_epochs(10));
        let mut recorder = Recorder::new(learner.interrupter());
        recorder.stop_at = Some((3, 1));

        let outcome = learner
            .fit(&mut model, &dataset, &InMemDataset::new(Vec::new()), &mut recorder)
            .unwrap();

        assert_eq!(outcome, TrainingOutcome::Aborted { epoch: 3 });
        assert!(outcome.is_aborted());
        assert_eq!(recorder.epochs.len(), 3);
        let last = recorder.epochs.last().unwrap();
        assert!(last.aborted);
        assert_eq!(last.iterations, 1);
        assert_eq!(last.validation_accuracy, None);
        assert_eq!(learner.state(), TrainerState::ReadyToTrain);
        assert_eq!(learner.optimizer_state().len(), 4);
    }

    #[test]
    fn interruption_on_the_last_batch_ends_that_epoch() {
        let arena = Arena::new();
        let mut model = small_model(&arena);
        let dataset = digits(64);
        let mut learner = Learner::new(config().with_num_epochs(10));
        let mut recorder = Recorder::new(learner.interrupter());
        recorder.stop_at = Some((3, 4));

        let outcome = learner
            .fit(&mut model, &dataset, &digits(16), &mut recorder)
            .unwrap();

        assert_eq!(outcome, TrainingOutcome::Aborted { epoch: 3 });
        assert_eq!(recorder.batches, 12);
        assert_eq!(
            recorder
                .epochs
                .iter()
                .map(|p| (p.epoch, p.iterations, p.aborted))
                .collect::<Vec<_>>(),
            vec![(1, 4, false), (2, 4, false), (3, 4, true)]
        );
        assert_eq!(recorder.epochs[2].validation_accuracy, None);
        assert_eq!(learner.optimizer_state().len(), 4);
    }

    #[test]
    fn epoch_without_steps_repeats_the_previous_metrics() {
        let arena = Arena::new();
        let mut model = small_model(&arena);
        let dataset = digits(32);
        let mut learner = Learner::new(config().with_num_epochs(5));
        let mut recorder = Recorder::new(learner.interrupter());
        recorder.stop_after_epoch = Some(2);

        let outcome = learner
            .fit(&mut model, &dataset, &dataset, &mut recorder)
            .unwrap();

        assert_eq!(outcome, TrainingOutcome::Aborted { epoch: 3 });
        assert_eq!(recorder.epochs.len(), 3);
        let (second, third) = (&recorder.epochs[1], &recorder.epochs[2]);
        assert_eq!(third.iterations, 0);
        assert!(third.aborted);
        assert_eq!(third.loss, second.loss);
        assert_eq!(third.accuracy, second.accuracy);
    }

    #[test]
    fn invalid_samples_are_skipped_and_counted() {
        let arena = Arena::new();
        let mut model = small_model(&arena);
        let mut items = digits(20).iter().collect::<Vec<_>>();
        items.push(DigitItem::new(vec![0.0; 9], [3, 3, 1], 1));
        items.push(DigitItem::new(vec![0.0; 28 * 28], [28, 28, 1], 11));
        let train = InMemDataset::new(items);
        let mut learner = Learner::new(config().with_num_epochs(1).with_shuffle(false));
        let mut events = Vec::new();

        learner
            .fit(&mut model, &train, &digits(10), &mut |p: TrainingProgress| {
                events.push(p)
            })
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].skipped_samples, 2);
    }

    #[test]
    fn empty_dataset_is_refused() {
        let arena = Arena::new();
        let mut model = small_model(&arena);
        let mut learner = Learner::new(config());
        let empty = InMemDataset::<DigitItem>::new(Vec::new());

        let err = learner
            .fit(&mut model, &empty, &empty, &mut NoProgress)
            .unwrap_err();

        assert_eq!(err, TrainingError::EmptyDataset);
        assert_eq!(learner.state(), TrainerState::Uninitialized);
    }

    #[test]
    fn failure_returns_to_ready_to_train() {
        // Room for the parameters, not for a batch of 16 images.
        let arena = Arena::with_capacity(64 * 1024);
        let mut model = small_model(&arena);
        let dataset = digits(32);
        let mut learner = Learner::new(config());

        let result = learner.fit(&mut model, &dataset, &dataset, &mut NoProgress);

        assert!(result.is_err());
        assert_eq!(learner.state(), TrainerState::ReadyToTrain);
        assert_eq!(arena.live_bytes(), model.num_params() * 4);
    }

    #[test]
    fn trained_learner_trains_again() {
        let arena = Arena::new();
        let mut model = small_model(&arena);
        let dataset = digits(16);
        let mut learner = Learner::with_optimizer(config(), SgdConfig::new().init());

        learner
            .fit(&mut model, &dataset, &dataset, &mut NoProgress)
            .unwrap();
        let outcome = learner
            .fit(&mut model, &dataset, &dataset, &mut NoProgress)
            .unwrap();

        assert_eq!(outcome, TrainingOutcome::Completed { epochs: 2 });
        assert_eq!(learner.state(), TrainerState::Trained);
    }

    #[test]
    fn zero_batch_size_is_refused_before_loading() {
        let arena = Arena::new();
        let mut model = small_model(&arena);
        let dataset = digits(8);
        let mut learner = Learner::new(config().with_batch_size(0));

        let err = learner
            .fit(&mut model, &dataset, &dataset, &mut NoProgress)
            .unwrap_err();

        assert!(matches!(err, TrainingError::InvalidConfig(_)));
        assert_eq!(learner.state(), TrainerState::Uninitialized);
    }

    #[test]
    fn interrupter_can_be_reset() {
        let interrupter = Interrupter::new();
        let shared = interrupter.clone();

        shared.stop();
        assert!(interrupter.should_stop());

        interrupter.reset();
        assert!(!shared.should_stop());
    }
}
