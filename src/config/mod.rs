//! Configuration module for the archive client
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; an empty file yields the archive defaults.
//!
//! # Example
//!
//! ```no_run
//! use ao3_client::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("ao3.toml")).unwrap();
//! println!("Requests per window: {:?}", config.requests.max_per_window);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ArchiveConfig, ClientConfig, PoolConfig, RequestsConfig, ResourcesConfig, UserAgentConfig,
    DEFAULT_BASE_URL,
};

// Re-export parser functions
pub use parser::{load_config, parse_config};
