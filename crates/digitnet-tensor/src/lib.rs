#![warn(missing_docs)]

//! This library provides the tensor type of the digitnet engine along with the
//! arena every tensor is allocated from and the CPU kernels the layers use.

#[macro_use]
extern crate derive_new;

mod arena;
mod distribution;
mod error;
mod shape;
mod tensor;

/// CPU kernels operating on [tensors](Tensor).
pub mod ops;

pub use arena::*;
pub use distribution::*;
pub use error::*;
pub use shape::*;
pub use tensor::*;

/// Result type of every fallible tensor operation.
pub type Result<T> = core::result::Result<T, TensorError>;
