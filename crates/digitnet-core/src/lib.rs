#![warn(missing_docs)]

//! The core crate of digitnet: configuration, layers, the sequential model and its optimizers.

#[macro_use]
extern crate derive_new;

/// Configuration of models, optimizers and training.
pub mod config;

/// Layers and loss of the sequential model.
pub mod nn;

/// Optimizers updating the model parameters.
pub mod optim;

mod error;
mod model;

pub use error::*;
pub use model::*;

pub use digitnet_tensor as tensor;

/// Learning rate used by the optimizers.
pub type LearningRate = f64;
