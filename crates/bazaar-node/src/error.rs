//! Error types for the node.

use std::path::PathBuf;

use bazaar_agent::AgentError;
use bazaar_core::{CapabilityError, DirectoryError};
use bazaar_orchestrator::OrchestratorError;
use thiserror::Error;

/// Configuration problems. These are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read or written.
    #[error("config file '{}': {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`crate::config::MarketConfig`].
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be rendered as TOML.
    #[error("cannot render config: {0}")]
    Render(#[from] toml::ser::Error),

    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A capability in the config is malformed.
    #[error("invalid capability in configuration: {0}")]
    Capability(#[from] CapabilityError),

    /// The remote AI backend needs an API key that is not set.
    #[error("missing AI credentials: environment variable {env_var} is not set")]
    MissingCredentials {
        /// Variable that was expected to hold the key.
        env_var: String,
    },
}

/// Errors from running a node or the demo market.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A capability tag was rejected.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// The mediator refused or could not be reached.
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// A direct negotiation failed.
    #[error("negotiation failed: {0}")]
    Agent(#[from] AgentError),

    /// An orchestrated request failed.
    #[error("orchestration failed: {0}")]
    Orchestrator(#[from] OrchestratorError),

    /// Output could not be serialized.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
