//! # bazaar-node
//!
//! Runs a Bazaar marketplace: configuration, AI backends, tracing setup and
//! an in-process demo market. The `bazaar` binary wraps this crate.
//!
//! ## Example
//!
//! ```rust
//! use bazaar_node::config::MarketConfig;
//!
//! let config = MarketConfig::from_toml("[provider]\nttl_secs = 300").unwrap();
//! assert_eq!(config.cache_config().unwrap().ttl.as_secs(), 300);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ai;
pub mod config;
pub mod demo;
pub mod error;
pub mod telemetry;

pub use ai::{build_ai, ChatCompletionsAi, HeuristicAi};
pub use config::MarketConfig;
pub use demo::{DemoOptions, DemoReport};
pub use error::{ConfigError, NodeError, Result};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
