pub mod config;
pub mod error;
pub mod types;

pub use config::EffectorConfig;
pub use error::{EffectorError, Result};
pub use types::*;
