/// Lifecycle of a [learner](crate::Learner).
///
/// ```text
/// Uninitialized -> DataLoading -> ReadyToTrain -> Training -> Trained
/// ```
///
/// `Training -> ReadyToTrain` is taken when a run fails or is interrupted. A ready learner loads
/// the data of its next run again, a trained one goes straight back to training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrainerState {
    /// No data was ever loaded.
    #[default]
    Uninitialized,
    /// Checking the datasets and the configuration.
    DataLoading,
    /// Data is loaded and the model may be trained.
    ReadyToTrain,
    /// Epochs are running.
    Training,
    /// Every requested epoch completed.
    Trained,
}

impl TrainerState {
    /// Whether the learner may move from this state to `next`.
    pub fn can_transition_to(self, next: TrainerState) -> bool {
        use TrainerState::*;

        matches!(
            (self, next),
            (Uninitialized, DataLoading)
                | (DataLoading, ReadyToTrain)
                | (ReadyToTrain, Training)
                | (ReadyToTrain, DataLoading)
                | (Training, Trained)
                | (Training, ReadyToTrain)
                | (Trained, Training)
                | (Trained, DataLoading)
        )
    }
}
