//! Configuration module for Spindle
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and turning the `[[task]]` entries into seeds for the engine.
//!
//! # Example
//!
//! ```no_run
//! use spindle::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("spindle.toml")).unwrap();
//! println!("Engine will use {} workers", config.engine.worker_count);
//! ```

mod bind;
mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, EngineConfig, FetcherConfig, FetcherKind, LimitConfig, StorageConfig, TaskConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub use bind::{build_limiter, build_seeds, configure_engine};
