//! Error types for Strata Core
//!
//! Provides a unified error type for all workspace operations. Every
//! operation returns these to its immediate caller; nothing here retries.

use thiserror::Error;

/// Result type for Strata Core operations
pub type Result<T> = std::result::Result<T, StrataError>;

/// Unified error type for Strata Core
#[derive(Error, Debug)]
pub enum StrataError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error (workspace options, settings files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stack or key does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stack already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Stack name does not match the allowed pattern
    #[error("Invalid stack name '{0}': names may only contain alphanumerics, '-', '_' and '.'")]
    InvalidName(String),

    /// Malformed path-addressed key, or a path that does not fit the value
    #[error("Invalid config path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Mutation attempted while the stack is updating
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Removal refused because the stack has unapplied edits or resources
    #[error("Dirty state: {0}")]
    DirtyState(String),

    /// Deployment could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// Deployment document could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// External engine exited non-zero
    #[error("Command failed with exit code {exit_code}: {stderr}")]
    Command { exit_code: i32, stderr: String },

    /// Saved project settings name a different project than the one on disk
    #[error("Project mismatch: workspace holds project '{expected}', refusing to save '{found}'")]
    ProjectMismatch { expected: String, found: String },

    /// Encryption or decryption of a secret value failed
    #[error("Secrets error: {0}")]
    Secrets(String),

    /// Caller cancelled before or after the external call
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl StrataError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        StrataError::Config(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        StrataError::NotFound(msg.into())
    }

    /// Create an already exists error
    pub fn already_exists(msg: impl Into<String>) -> Self {
        StrataError::AlreadyExists(msg.into())
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        StrataError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        StrataError::Conflict(msg.into())
    }

    /// Create a dirty state error
    pub fn dirty_state(msg: impl Into<String>) -> Self {
        StrataError::DirtyState(msg.into())
    }

    /// Create an encode error
    pub fn encode(msg: impl Into<String>) -> Self {
        StrataError::Encode(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        StrataError::Decode(msg.into())
    }

    /// Create a secrets error
    pub fn secrets(msg: impl Into<String>) -> Self {
        StrataError::Secrets(msg.into())
    }

    /// Decryption failure for a named config key.
    ///
    /// Secrets are encrypted per stack, so the usual cause is a value copied
    /// from another stack's settings file.
    pub fn decrypt_failed(key: &str, cause: impl std::fmt::Display) -> Self {
        StrataError::Secrets(format!(
            "failed to decrypt encrypted configuration value '{key}': {cause}. \
             This can occur when a secret is copied from one stack to another; \
             re-set it with `strata config set {key} <value> --secret` on the target stack"
        ))
    }

    /// Whether this error means the target does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StrataError::NotFound(_))
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for StrataError {
    fn from(err: toml::de::Error) -> Self {
        StrataError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for StrataError {
    fn from(err: toml::ser::Error) -> Self {
        StrataError::Serialization(err.to_string())
    }
}
