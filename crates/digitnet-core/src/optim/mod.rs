mod adam;
mod base;
mod sgd;

pub use adam::*;
pub use base::*;
pub use sgd::*;
