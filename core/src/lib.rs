pub mod application;
pub mod cli;
pub mod codec;
pub mod config;
pub mod db;
pub mod driver;
pub mod processor;
pub mod services;
pub mod source;
pub mod stats;
pub mod types;

// Re-export main types
pub use types::*;

pub use application::{initialize, Application, InitBuilder, InitOptions};
pub use driver::{run_slice, DriverError};
