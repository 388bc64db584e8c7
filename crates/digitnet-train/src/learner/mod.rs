mod base;
mod config;
mod epoch;
mod logging;
mod state;

pub use base::*;
pub use config::*;
pub use logging::*;
pub use state::*;
