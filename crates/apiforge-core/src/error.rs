//! Error handling for the apiforge generation library.
//!
//! This module defines the main error type `Error` used throughout the library,
//! along with a convenient `Result` type alias. Only failures of the outside
//! world surface here: unreadable or malformed API documents, model transport
//! problems and I/O. Problems with *generated* artifacts (bad syntax, tests that
//! do not collect) are reported as validation diagnostics instead.
//!
//! # Examples
//!
//! ```
//! use apiforge_core::error::{Error, Result};
//!
//! fn might_fail(ok: bool) -> Result<()> {
//!     if ok {
//!         Ok(())
//!     } else {
//!         Err(Error::document("no paths"))
//!     }
//! }
//!
//! assert!(might_fail(true).is_ok());
//! assert!(might_fail(false).is_err());
//! ```

use std::time::Duration;

use thiserror::Error;

/// Result type for apiforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for apiforge operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The API document could not be understood
    #[error("Document error: {0}")]
    Document(String),

    /// The language model provider failed or answered with something unusable
    #[error("Model error: {0}")]
    Model(String),

    /// A model call exceeded its deadline
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    /// Template error
    #[error("Template error: {0}")]
    Template(String),

    /// Template engine error
    #[error("Template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new document error
    pub fn document<S: Into<String>>(msg: S) -> Self {
        Self::Document(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new template error
    pub fn template<S: Into<String>>(msg: S) -> Self {
        Self::Template(msg.into())
    }
}
