pub mod config;
pub mod error;
pub mod types;

pub use config::SelahConfig;
pub use error::{Result, SelahError};
pub use types::*;
