mod glyph;
mod preprocess;
mod sample;
mod synthetic;

pub use preprocess::*;
pub use sample::*;
pub use synthetic::*;
