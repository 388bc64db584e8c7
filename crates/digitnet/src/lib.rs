#![warn(missing_docs)]

//! # Digitnet
//!
//! A small neural network engine classifying handwritten digits, from the tensor arena up to the
//! two calls an outer surface needs: [submit a drawing](submit_drawing) and
//! [request a training run](request_training).

#[macro_use]
extern crate derive_new;

/// Ranked predictions from the model output.
pub mod inference;

mod engine;
mod error;

pub use engine::*;
pub use error::*;

pub use digitnet_core::*;

/// Datasets, synthetic digits and preprocessing.
pub mod data {
    pub use digitnet_dataset::*;
}

/// Training driver, metrics and progress reporting.
pub mod train {
    pub use digitnet_train::*;
}
