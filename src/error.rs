//! Unified error handling for the lanbeacon crate
//!
//! This module provides a unified error type that consolidates the
//! domain-specific errors into a single `Error` enum, while keeping the
//! domain-specific errors usable on their own.
//!
//! # Architecture
//!
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use lanbeacon::error::{Error, ErrorCategory};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!("Retrying after: {}", err);
//!     } else {
//!         tracing::error!("Fatal error: {}", err);
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::discovery::NodeError;
pub use crate::registry::RegistryError;
pub use crate::wire::CodecError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Socket and interface errors
    Network,
    /// Wire encode/decode errors
    Codec,
    /// Registry lookups and registrations
    Registry,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Codec => "codec",
            Self::Registry => "registry",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the lanbeacon crate
#[derive(Error, Debug)]
pub enum Error {
    /// Discovery node startup and socket errors
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    /// Wire format errors
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Node(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Codec(_) => false,
            Self::Registry(RegistryError::InstanceNotFound(_)) => true,
            Self::Registry(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Node(_) | Self::Io(_) => ErrorCategory::Network,
            Self::Codec(_) => ErrorCategory::Codec,
            Self::Registry(_) => ErrorCategory::Registry,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
