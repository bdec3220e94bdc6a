mod allocation;
mod config;
mod constants;
mod error;
mod stats;

pub use allocation::*;
pub use config::*;
pub use constants::*;
pub use error::*;
pub use stats::*;
