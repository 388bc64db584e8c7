use digitnet_core::optim::{Optimizer, OptimizerState};
use digitnet_core::{LearningRate, Model};
use digitnet_dataset::vision::DigitItem;
use digitnet_dataset::Dataset;

use crate::metric::{AccuracyMetric, Adaptor, LossMetric, Metric, Numeric};
use crate::{
    BatchIterator, BatchProgress, Interrupter, ProgressSink, SampleBatcher, TrainingError,
};

/// Metrics of one pass over a dataset.
#[derive(Debug, Clone, Default)]
pub(crate) struct EpochSummary {
    pub loss: f64,
    pub accuracy: f64,
    pub skipped: usize,
    pub iterations: usize,
    pub interrupted: bool,
}

/// A training epoch.
#[derive(new)]
pub(crate) struct TrainEpoch<'a, O> {
    batcher: &'a SampleBatcher,
    optim: &'a O,
    lr: LearningRate,
    interrupter: &'a Interrupter,
    epoch: usize,
    epoch_total: usize,
    batch_size: usize,
}

impl<O: Optimizer> TrainEpoch<'_, O> {
    /// Runs the training epoch.
    ///
    /// The interrupter is checked before every batch and after the sink saw each one; once it
    /// is set the epoch ends early and the summary is flagged as interrupted.
    pub(crate) fn run<D>(
        &self,
        model: &mut Model,
        optim_state: &mut OptimizerState<O::State>,
        dataset: &D,
        sink: &mut dyn ProgressSink,
    ) -> Result<EpochSummary, TrainingError>
    where
        D: Dataset<DigitItem>,
    {
        log::info!("Executing training step for epoch {}", self.epoch);

        let mut loss = LossMetric::new();
        let mut accuracy = AccuracyMetric::new();
        let mut summary = EpochSummary::default();
        let mut iterator = BatchIterator::new(dataset, self.batch_size);
        let items_total = dataset.len();

        while let Some(items) = iterator.next() {
            if self.interrupter.should_stop() {
                summary.interrupted = true;
                break;
            }

            let num_items = items.len();
            let Some(batch) = self.batcher.batch(model.arena(), &items)? else {
                summary.skipped += num_items;
                continue;
            };
            summary.skipped += batch.skipped;

            let output =
                model.train_step(&batch.images, &batch.targets, self.optim, self.lr, optim_state)?;
            summary.iterations += 1;

            let entry_loss = loss.update(&output.adapt());
            let entry_accuracy = accuracy.update(&output.adapt());
            log::debug!(
                "Iteration {}: {} {} | {} {}",
                summary.iterations,
                entry_loss.name,
                entry_loss.formatted,
                entry_accuracy.name,
                entry_accuracy.formatted
            );

            sink.on_batch_end(BatchProgress::new(
                self.epoch,
                self.epoch_total,
                summary.iterations,
                iterator.items_processed(),
                items_total,
                output.loss as f64,
            ));

            if self.interrupter.should_stop() {
                summary.interrupted = true;
                break;
            }
        }

        summary.loss = loss.value();
        summary.accuracy = accuracy.value();

        Ok(summary)
    }
}

/// A validation epoch.
#[derive(new)]
pub(crate) struct ValidEpoch<'a> {
    batcher: &'a SampleBatcher,
    epoch: usize,
    batch_size: usize,
}

impl ValidEpoch<'_> {
    /// Runs the validation epoch, forward passes only.
    pub(crate) fn run<D>(&self, model: &Model, dataset: &D) -> Result<EpochSummary, TrainingError>
    where
        D: Dataset<DigitItem>,
    {
        log::info!("Executing validation step for epoch {}", self.epoch);

        let mut loss = LossMetric::new();
        let mut accuracy = AccuracyMetric::new();
        let mut summary = EpochSummary::default();

        for items in BatchIterator::new(dataset, self.batch_size) {
            let num_items = items.len();
            let Some(batch) = self.batcher.batch(model.arena(), &items)? else {
                summary.skipped += num_items;
                continue;
            };
            summary.skipped += batch.skipped;

            let output = model.evaluate(&batch.images, &batch.targets)?;
            loss.update(&output.adapt());
            accuracy.update(&output.adapt());
            summary.iterations += 1;
        }

        summary.loss = loss.value();
        summary.accuracy = accuracy.value();

        Ok(summary)
    }
}
