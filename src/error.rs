//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the entire crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of failures remote instrument control produces, from transport
//! problems to request-level faults.
//!
//! ## Error Hierarchy
//!
//! `DaqError` is an enum that consolidates various error sources:
//!
//! - **`Config`**: Wraps errors from the `config` crate, typically related to file parsing
//!   or format issues in the configuration files.
//! - **`Configuration`**: Represents semantic errors in the configuration, such as values
//!   that parse fine but are logically invalid (e.g., a zero channel capacity). These are
//!   caught during the validation step.
//! - **`Io`** / **`Serialization`**: Wrap `std::io::Error` and `serde_json::Error` for the
//!   scratch-file and metadata writers.
//! - **`Connection`**: The instrument link itself is unusable. This is the only error that
//!   is fatal to manager construction; at runtime it marks requests that cannot reach the
//!   hardware at all (for example addressing a generator that was never attached).
//! - **`Timeout`**: A request was accepted but no reply arrived within the deadline. The
//!   request may still execute on the device; callers must treat the outcome as unknown.
//! - **`AttributeNotFound`** / **`TypeCoercion`**: Request-level faults, reported back to
//!   the caller without disturbing the acquisition loop.
//! - **`ShapeMismatch`**: A capture's sample vector is empty or disagrees in length with
//!   the regulator's history, so no spectral decision can be made from it.
//! - **`ManagerNotRunning`**: A request was issued to an actor that has already stopped.
//! - **`QueueOverflow`**: A slow consumer lost samples because the bounded output channel
//!   evicted its oldest entries.
//!
//! By using `#[from]`, `DaqError` can be seamlessly created from underlying error types,
//! simplifying error handling throughout the crate with the `?` operator.

use std::time::Duration;

use thiserror::Error;

use crate::instrument::Target;

/// Convenience alias for results using the crate error type.
pub type DaqResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection error on {target}: {reason}")]
    Connection { target: Target, reason: String },

    #[error("Request '{operation}' to {target} timed out after {deadline:?}")]
    Timeout {
        target: Target,
        operation: String,
        deadline: Duration,
    },

    #[error("Attribute '{attribute}' not recognized for {target}")]
    AttributeNotFound { target: Target, attribute: String },

    #[error("Cannot coerce {value} to {expected} for {target} attribute '{attribute}'")]
    TypeCoercion {
        target: Target,
        attribute: String,
        expected: &'static str,
        value: String,
    },

    #[error("Sample shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Manager is not running")]
    ManagerNotRunning,

    #[error("Output channel overflowed; {dropped} capture(s) dropped")]
    QueueOverflow { dropped: u64 },

    #[error("Shutdown timed out after {0:?}; instrument handles may still be open")]
    ShutdownTimeout(Duration),

    #[error("Scheduler stopped with {count} job(s) unexecuted")]
    JobsAbandoned { count: usize },
}
