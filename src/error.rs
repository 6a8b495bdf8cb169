//! # Error Handling
//!
//! This module defines the centralized error type for `kdb-state`. It uses the
//! `thiserror` library to build a single `Error` enum covering every failure
//! mode of the library, grouped the way callers need to react to them:
//!
//! - **Validation errors** (`InvalidKeyName`, `InvalidMountpoint`,
//!   `InvalidPluginName`, `Validation`, `ConfigParse`): raised before any key
//!   database I/O happens. They are never retried and are surfaced verbatim.
//! - **Store errors** (`Store`): a failed `get`/`set` on a key database
//!   session. The wrapped [`StoreError`] carries the structured description
//!   reported by the store so the user can see which plugin, mountpoint or
//!   file caused the failure.
//! - **Composition errors** (`Composition`): the plugin resolver could not
//!   satisfy a dependency, or a backend could not be serialized.
//!
//! The remaining variants wrap foreign errors (I/O, YAML, JSON, regex) and
//! lock poisoning inside the in-memory store.

use std::fmt;

use thiserror::Error;

/// Structured description of a failed key database operation.
///
/// Mirrors the error information a key database attaches to a failed
/// commit: which module raised it, for which mountpoint and which file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreError {
    /// Short description of the failure.
    pub description: String,
    /// Detailed reason as reported by the failing module.
    pub reason: String,
    /// Numeric error code of the key database.
    pub error_number: u32,
    /// Module (plugin) that raised the error.
    pub module: String,
    /// Configuration file involved, if any.
    pub config_file: String,
    /// Mountpoint involved, if any.
    pub mountpoint: String,
}

impl StoreError {
    /// Create a store error with a description and a reason.
    pub fn new(description: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            reason: reason.into(),
            ..Self::default()
        }
    }

    pub fn with_number(mut self, number: u32) -> Self {
        self.error_number = number;
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn with_config_file(mut self, file: impl Into<String>) -> Self {
        self.config_file = file.into();
        self
    }

    pub fn with_mountpoint(mut self, mountpoint: impl Into<String>) -> Self {
        self.mountpoint = mountpoint.into();
        self
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)?;
        if self.error_number != 0 {
            write!(f, " (error #{})", self.error_number)?;
        }
        if !self.reason.is_empty() {
            write!(f, "\n  reason: {}", self.reason)?;
        }
        if !self.module.is_empty() {
            write!(f, "\n  module: {}", self.module)?;
        }
        if !self.config_file.is_empty() {
            write!(f, "\n  configfile: {}", self.config_file)?;
        }
        if !self.mountpoint.is_empty() {
            write!(f, "\n  mountpoint: {}", self.mountpoint)?;
        }
        Ok(())
    }
}

/// Main error type for kdb-state operations
#[derive(Error, Debug)]
pub enum Error {
    /// A key name is not a valid hierarchical key name.
    #[error("Invalid key name '{name}': {message}")]
    InvalidKeyName { name: String, message: String },

    /// A mountpoint name is not valid for mounting a backend.
    #[error("Invalid mountpoint '{name}': {message}")]
    InvalidMountpoint { name: String, message: String },

    /// A plugin name contains characters a plugin name cannot have.
    #[error("Invalid plugin name '{name}'")]
    InvalidPluginName { name: String },

    /// A resource declaration is inconsistent (e.g. `check` on a spec key).
    #[error("Invalid resource {resource}: {message}")]
    Validation { resource: String, message: String },

    /// The manifest could not be parsed.
    ///
    /// Includes an optional hint about how to fix the manifest.
    #[error("Manifest parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the manifest
        hint: Option<String>,
    },

    /// A key database session failed.
    #[error("Key database error: {0}")]
    Store(StoreError),

    /// The backend for a mountpoint could not be composed.
    #[error("Backend composition error for {mountpoint}: {message}")]
    Composition { mountpoint: String, message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err)
    }
}

impl Error {
    /// Whether this error was raised before any key database I/O.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidKeyName { .. }
                | Error::InvalidMountpoint { .. }
                | Error::InvalidPluginName { .. }
                | Error::Validation { .. }
                | Error::ConfigParse { .. }
        )
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
