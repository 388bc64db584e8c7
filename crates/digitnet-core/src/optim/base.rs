use digitnet_tensor::{Result, Tensor, TensorCollection};

use crate::LearningRate;

/// Optimizer updating one parameter tensor at a time.
///
/// The optimizer itself is stateless: the state of each parameter (moments, time step) is handed
/// in and the next one returned, so a caller can apply the updates of a whole model at once or
/// not at all.
pub trait Optimizer: Send + Sync {
    /// State kept for each parameter between steps.
    type State: TensorCollection + Send;

    /// Computes the next value of a parameter and its next state.
    ///
    /// # Arguments
    ///
    /// * `lr` - The learning rate.
    /// * `tensor` - The current value of the parameter.
    /// * `grad` - The gradient of the loss with respect to the parameter.
    /// * `state` - The state from the previous step, `None` on the first step.
    fn step(
        &self,
        lr: LearningRate,
        tensor: &Tensor,
        grad: &Tensor,
        state: Option<&Self::State>,
    ) -> Result<(Tensor, Self::State)>;
}

/// Optimizer state of every parameter of a model, in the order the model lists its parameters.
#[derive(Debug)]
pub struct OptimizerState<S> {
    params: Vec<Option<S>>,
}

impl<S> Default for OptimizerState<S> {
    fn default() -> Self {
        Self { params: Vec::new() }
    }
}

impl<S> OptimizerState<S> {
    /// Creates an empty state, used before the first step.
    pub fn new() -> Self {
        Self::default()
    }

    /// The state of the parameter at `index`.
    pub fn get(&self, index: usize) -> Option<&S> {
        self.params.get(index).and_then(Option::as_ref)
    }

    /// Number of parameters holding a state.
    pub fn len(&self) -> usize {
        self.params.iter().filter(|state| state.is_some()).count()
    }

    /// Whether no step was applied yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn from_states(states: Vec<S>) -> Self {
        Self {
            params: states.into_iter().map(Some).collect(),
        }
    }
}
