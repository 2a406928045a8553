pub mod config;
pub mod core;

// Re-export commonly used items for convenience
pub use config::{ConfigError, EngineConfig};
pub use core::*;
