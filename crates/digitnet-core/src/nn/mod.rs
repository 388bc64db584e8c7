mod activation;
mod conv2d;
mod dense;
mod flatten;
mod initializer;
mod layer;
mod loss;
mod pool;
mod softmax;
mod spec;

pub use activation::*;
pub use conv2d::*;
pub use dense::*;
pub use flatten::*;
pub use initializer::*;
pub use layer::*;
pub use loss::*;
pub use pool::*;
pub use softmax::*;
pub use spec::*;
