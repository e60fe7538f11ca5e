//! Error types for the zoo dispatcher
//!
//! This module provides user-friendly error types with actionable messages
//! that help diagnose and resolve issues.

use thiserror::Error;

/// Result type alias for zoo operations
pub type Result<T> = std::result::Result<T, ZooError>;

/// Main error type for the zoo dispatcher
///
/// All errors include contextual information to help operators understand
/// what went wrong and how to fix it.
#[derive(Error, Debug)]
pub enum ZooError {
    /// File system operations failed (read, write, delete, etc.)
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("Failed to process JSON data: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Inbound broker message could not be decoded into a job descriptor
    #[error("Failed to decode work message: {reason}. The message will be dropped; broker redelivery semantics apply.")]
    Decode { reason: String },

    /// Artifact fetch failed on every configured URI
    #[error("Download of '{filename}' failed: {reason}. The job will be negatively acknowledged and re-queued by the broker.")]
    Download { filename: String, reason: String },

    /// Broker-level operation failed (connect, declare, ack, nack)
    #[error("Broker operation '{operation}' failed: {reason}. Check the rabbit settings and that the broker is reachable.")]
    Broker { operation: String, reason: String },

    /// Publishing an outbound message failed
    #[error("Publish on routing key '{routing_key}' failed: {reason}")]
    Publish {
        routing_key: String,
        reason: String,
    },

    /// Configuration is missing or invalid
    #[error("Configuration error: {message}. {suggestion}")]
    Config { message: String, suggestion: String },
}

impl ZooError {
    /// Create a decode error
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Create a download error
    pub fn download(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Download {
            filename: filename.into(),
            reason: reason.into(),
        }
    }

    /// Create a broker error
    pub fn broker(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Broker {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a publish error
    pub fn publish(routing_key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Publish {
            routing_key: routing_key.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error with suggestion
    pub fn config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}
