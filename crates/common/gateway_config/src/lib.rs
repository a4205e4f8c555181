mod config;
mod error;
pub mod logging;

pub use config::*;
pub use error::*;
