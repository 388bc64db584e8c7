use serde::{Deserialize, Serialize};

/// Snapshot of the training taken at the end of an epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingProgress {
    /// The epoch, starting at 1.
    pub epoch: usize,
    /// Number of epochs requested.
    pub total_epochs: usize,
    /// Mean training loss over the items of the epoch.
    ///
    /// An epoch without any training step (`iterations == 0`) takes no measurement: it repeats
    /// the loss of the previous epoch, or reports 0 when it is the first one.
    pub loss: f64,
    /// Fraction of the training items classified correctly, carried over like the loss when
    /// no step was applied.
    pub accuracy: f64,
    /// Fraction of the validation items classified correctly, `None` without validation items.
    pub validation_accuracy: Option<f64>,
    /// Mean validation loss, `None` without validation items.
    pub validation_loss: Option<f64>,
    /// Invalid samples skipped during the epoch.
    pub skipped_samples: usize,
    /// Number of training steps applied during the epoch.
    pub iterations: usize,
    /// Whether training was interrupted during this epoch.
    pub aborted: bool,
}

/// Progress within an epoch, reported after every batch.
#[derive(new, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// The epoch, starting at 1.
    pub epoch: usize,
    /// Number of epochs requested.
    pub total_epochs: usize,
    /// Training steps applied so far in the epoch.
    pub iteration: usize,
    /// Items processed so far in the epoch.
    pub items_processed: usize,
    /// Items in the epoch.
    pub items_total: usize,
    /// Loss of the last batch.
    pub loss: f64,
}

/// Receives the progress of a training run.
///
/// Both callbacks run on the training thread, between batches. They are the points where the
/// caller may request an interruption.
pub trait ProgressSink {
    /// Called after each training batch.
    fn on_batch_end(&mut self, _progress: BatchProgress) {}

    /// Called once per epoch, including the epoch an interruption cut short.
    fn on_epoch_end(&mut self, progress: TrainingProgress);
}

impl<F> ProgressSink for F
where
    F: FnMut(TrainingProgress),
{
    fn on_epoch_end(&mut self, progress: TrainingProgress) {
        self(progress)
    }
}

/// Sink discarding every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_epoch_end(&mut self, _progress: TrainingProgress) {}
}

/// Receiving side of a [progress channel](progress_channel).
pub type ProgressReceiver = async_channel::Receiver<TrainingProgress>;

/// Sending side of a [progress channel](progress_channel).
#[derive(Debug, Clone)]
pub struct ProgressSender {
    sender: async_channel::Sender<TrainingProgress>,
}

/// Creates a bounded channel of [progress](TrainingProgress) snapshots.
///
/// The training thread blocks while the channel is full, so the receiver should be drained from
/// another thread or task when `capacity` is lower than the number of epochs.
pub fn progress_channel(capacity: usize) -> (ProgressSender, ProgressReceiver) {
    let (sender, receiver) = async_channel::bounded(capacity.max(1));

    (ProgressSender { sender }, receiver)
}

impl ProgressSink for ProgressSender {
    fn on_epoch_end(&mut self, progress: TrainingProgress) {
        let epoch = progress.epoch;

        if self.sender.send_blocking(progress).is_err() {
            log::warn!("Progress receiver closed, dropping the progress of epoch {epoch}");
        }
    }
}
