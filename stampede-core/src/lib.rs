mod config;
mod constants;
pub mod duration_str;
mod error;
mod schedule;
mod stats;
mod target;

pub use config::*;
pub use constants::*;
pub use error::*;
pub use schedule::*;
pub use stats::*;
pub use target::*;
