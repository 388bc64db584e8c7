#![warn(missing_docs)]

//! # Digitnet Dataset Library
//!
//! This library provides the dataset abstraction of digitnet, the transformations built on it,
//! the synthetic handwritten digits used for training and the preprocessing of drawings.

#[macro_use]
extern crate derive_new;

/// Dataset transformations.
pub mod transform;

/// Vision datasets and preprocessing.
pub mod vision;

mod dataset;
pub use dataset::*;
