//! Error types for the content-app bridge.
//!
//! Parsing and package lookup failures are recovered locally by the components
//! that hit them (skip and log). Routing failures that the protocol stack must
//! see are turned into structured responses by the router, and binder failures
//! are surfaced as explicit results. This enum is the shared vocabulary for all
//! of them.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::EndpointId;

/// Main error type for the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    // Capability / discovery errors
    #[error("Malformed capability descriptor for {package}: {message}")]
    MalformedDescriptor { package: String, message: String },

    #[error("Package lookup failed for {package}: {message}")]
    PackageLookupFailed { package: String, message: String },

    #[error("Content app not found: {name}")]
    AppNotFound { name: String },

    // Store errors
    #[error("Corrupt endpoint record for {key}: {message}")]
    RecordCorrupt { key: String, message: String },

    #[error("Endpoint {endpoint_id} is already assigned to {owner}")]
    EndpointConflict {
        endpoint_id: EndpointId,
        owner: String,
    },

    #[error("No free endpoint id left in the dynamic range")]
    EndpointSpaceExhausted,

    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // Routing errors
    #[error("Endpoint {0} is known but currently unreachable")]
    UnsupportedEndpoint(EndpointId),

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(EndpointId),

    #[error("No dispatch channel available")]
    ChannelUnavailable,

    #[error("Dispatch to {app} failed: {message}")]
    Dispatch { app: String, message: String },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    // Binder errors
    #[error("No trusted agent service satisfies permission checks")]
    NoTrustedAgent,

    #[error("Interrupted while waiting for the agent connection")]
    BindInterrupted,

    #[error("Agent connection lost ({address})")]
    AgentConnectionLost { address: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for BridgeError {
    fn from(err: rusqlite::Error) -> Self {
        BridgeError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl BridgeError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        BridgeError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Transport / dispatch / binder error
    /// - -32001: Unknown or unsupported endpoint
    /// - -32002: Content app or package not found
    /// - -32005: Validation error
    ///
    /// Standard codes: -32601 method not found, -32602 invalid params, -32603 internal.
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            BridgeError::Dispatch { .. }
            | BridgeError::Timeout(_)
            | BridgeError::ChannelUnavailable
            | BridgeError::NoTrustedAgent
            | BridgeError::BindInterrupted
            | BridgeError::AgentConnectionLost { .. } => -32000,

            BridgeError::UnknownEndpoint(_) | BridgeError::UnsupportedEndpoint(_) => -32001,

            BridgeError::AppNotFound { .. } | BridgeError::PackageLookupFailed { .. } => -32002,

            BridgeError::Validation { .. }
            | BridgeError::MalformedDescriptor { .. }
            | BridgeError::EndpointConflict { .. }
            | BridgeError::EndpointSpaceExhausted => -32005,

            BridgeError::MethodNotFound { .. } => -32601,
            BridgeError::InvalidParams { .. } => -32602,

            _ => -32603,
        }
    }

    /// Whether the protocol stack may reasonably retry the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Timeout(_)
                | BridgeError::ChannelUnavailable
                | BridgeError::AgentConnectionLost { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::UnknownEndpoint(EndpointId::new(99));
        assert_eq!(err.to_string(), "Unknown endpoint: 99");
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            BridgeError::UnsupportedEndpoint(EndpointId::new(7)).to_rpc_error_code(),
            -32001
        );
        assert_eq!(BridgeError::NoTrustedAgent.to_rpc_error_code(), -32000);
        assert_eq!(
            BridgeError::InvalidParams {
                message: "x".into()
            }
            .to_rpc_error_code(),
            -32602
        );
        assert_eq!(
            BridgeError::MethodNotFound {
                method: "x".into()
            }
            .to_rpc_error_code(),
            -32601
        );
        assert_eq!(BridgeError::Other("x".into()).to_rpc_error_code(), -32603);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(BridgeError::Timeout(std::time::Duration::from_secs(5)).is_retryable());
        assert!(!BridgeError::NoTrustedAgent.is_retryable());
    }
}
