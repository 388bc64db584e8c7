#![warn(missing_docs)]

//! A library for training the digitnet models.

#[macro_use]
extern crate derive_new;

/// The metric module.
pub mod metric;

mod batcher;
mod error;
mod learner;
mod progress;

pub use batcher::*;
pub use error::*;
pub use learner::*;
pub use progress::*;

#[cfg(test)]
pub(crate) mod test_utils;
