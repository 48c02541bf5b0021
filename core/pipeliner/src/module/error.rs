use thiserror::Error;

use super::ModuleId;

/// Error returned by [`Module::configure`](super::Module::configure).
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required parameter is absent or empty.
    #[error("required {0} parameter not found")]
    MissingParameter(String),
    /// A parameter is present but its value cannot be used.
    #[error("invalid value for parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
}

/// Error returned by the operations of a module that are not related to its configuration.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModuleError {
    /// The module does not implement this operation.
    #[error("{module} does not support {operation}")]
    Unsupported { module: ModuleId, operation: &'static str },
}
