mod activation;
mod conv;
mod interpolate;
mod matmul;
mod pool;

pub use activation::*;
pub use conv::*;
pub use interpolate::*;
pub use matmul::*;
pub use pool::*;
