pub mod config;
pub mod error;
pub mod db;
pub mod dataset;
pub mod encoder;
pub mod search;
pub mod eval;

pub use config::Config;
pub use error::{DensebenchError, Result};
