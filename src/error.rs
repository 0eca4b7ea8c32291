//! Error types and handling for the Garo Wallbox bridge
//!
//! This module defines the error type shared by the device client, the
//! driver and the web API, plus conversions from the libraries they use.

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, GaroError>;

/// Main error type for the bridge
#[derive(Debug, Error)]
pub enum GaroError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// HTTP transport errors talking to the wallbox
    #[error("HTTP error: {message}")]
    Http { message: String },

    /// The wallbox answered but rejected the request or sent something unexpected
    #[error("Device error: {message}")]
    Device { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Network-related errors (unreachable host, refused connection)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Unknown entity or resource
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// The device has not been set up yet or the driver is gone
    #[error("Unavailable: {message}")]
    Unavailable { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl GaroError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        GaroError::Config {
            message: message.into(),
        }
    }

    /// Create a new HTTP error
    pub fn http<S: Into<String>>(message: S) -> Self {
        GaroError::Http {
            message: message.into(),
        }
    }

    /// Create a new device error
    pub fn device<S: Into<String>>(message: S) -> Self {
        GaroError::Device {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        GaroError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        GaroError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        GaroError::Network {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        GaroError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        GaroError::NotFound {
            message: message.into(),
        }
    }

    /// Create a new unavailable error
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        GaroError::Unavailable {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        GaroError::Generic {
            message: message.into(),
        }
    }

    /// Whether the error means the wallbox could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            GaroError::Network { .. } | GaroError::Timeout { .. } | GaroError::Unavailable { .. }
        )
    }
}

impl From<std::io::Error> for GaroError {
    fn from(err: std::io::Error) -> Self {
        GaroError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for GaroError {
    fn from(err: serde_yaml::Error) -> Self {
        GaroError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GaroError {
    fn from(err: serde_json::Error) -> Self {
        GaroError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for GaroError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GaroError::timeout(err.to_string())
        } else if err.is_connect() {
            GaroError::network(err.to_string())
        } else if err.is_decode() {
            GaroError::Serialization {
                message: err.to_string(),
            }
        } else {
            GaroError::http(err.to_string())
        }
    }
}
