mod partial;
mod shuffle;

pub use partial::*;
pub use shuffle::*;
