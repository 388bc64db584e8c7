mod acc;
mod base;
mod loss;
mod state;

pub use acc::*;
pub use base::*;
pub use loss::*;
pub use state::*;
