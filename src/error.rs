//! Error types for the FFI bridge.
//!
//! This module defines error codes, the serializable diagnostic error value,
//! and the main error type used throughout the crate.

use serde::{Deserialize, Serialize};

use crate::handle::ResourceKind;

/// Error codes for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed handle value or invalid configuration
    InvalidConfig,
    /// Operation attempted on an already-disposed resource
    ResourceDisposed,
    /// Accessor invoked on a secure buffer after its content was wiped
    BufferCleared,
    /// The native destroy callback failed during disposal
    NativeDestroyFailed,
    /// The resource tracker hit its capacity ceiling
    TrackerCapacity,
    /// Internal bridge error (bug)
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::InvalidConfig => write!(f, "INVALID_CONFIG"),
            ErrorCode::ResourceDisposed => write!(f, "RESOURCE_DISPOSED"),
            ErrorCode::BufferCleared => write!(f, "BUFFER_CLEARED"),
            ErrorCode::NativeDestroyFailed => write!(f, "NATIVE_DESTROY_FAILED"),
            ErrorCode::TrackerCapacity => write!(f, "TRACKER_CAPACITY"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// Diagnostic error detail for FFI lifecycle failures
///
/// This is the value surfaced to the embedding application: serializable,
/// and carries an optional captured stack plus structured context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FfiError {
    /// Error code
    pub code: ErrorCode,

    /// Human-readable message
    pub message: String,

    /// Stack captured at the offending call site (if stack capture is enabled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl FfiError {
    /// Create a new FFI error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stack: None,
            context: None,
        }
    }

    /// Create an invalid-handle error
    pub fn invalid_handle(raw: i64) -> Self {
        Self::new(
            ErrorCode::InvalidConfig,
            format!(
                "Invalid native handle value: {} (must be a positive integer)",
                raw
            ),
        )
    }

    /// Create an invalid-config error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidConfig,
            format!("Invalid value for {}: {}", field.into(), reason.into()),
        )
    }

    /// Create a resource-disposed error
    pub fn resource_disposed(kind: ResourceKind) -> Self {
        Self::new(
            ErrorCode::ResourceDisposed,
            format!("{} resource has already been disposed", kind),
        )
    }

    /// Create a buffer-cleared error
    pub fn buffer_cleared(operation: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::BufferCleared,
            format!("Cannot {} on a cleared secure buffer", operation.into()),
        )
    }

    /// Create a native-destroy-failed error
    pub fn native_destroy_failed(kind: ResourceKind, detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::NativeDestroyFailed,
            format!("Native destroy for {} failed: {}", kind, detail.into()),
        )
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Add a captured stack
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Add context
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

impl std::fmt::Display for FfiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for FfiError {}

/// Main error type for the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// FFI lifecycle error
    #[error("FFI error: {0}")]
    Ffi(#[from] FfiError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Monitor error
    #[error("Monitor error: {0}")]
    Monitor(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl BridgeError {
    /// Convert to a diagnostic FfiError for reporting
    pub fn to_ffi_error(&self) -> FfiError {
        match self {
            BridgeError::Ffi(e) => e.clone(),
            BridgeError::Config(e) => FfiError::new(ErrorCode::InvalidConfig, e.to_string()),
            BridgeError::Io(e) => FfiError::new(ErrorCode::InternalError, e.to_string()),
            BridgeError::Serialization(msg) => FfiError::new(ErrorCode::InternalError, msg.clone()),
            BridgeError::Monitor(msg) => FfiError::new(ErrorCode::InternalError, msg.clone()),
            BridgeError::General(msg) => FfiError::new(ErrorCode::InternalError, msg.clone()),
        }
    }

    /// The error code this error maps to
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::Ffi(e) => e.code,
            BridgeError::Config(_) => ErrorCode::InvalidConfig,
            _ => ErrorCode::InternalError,
        }
    }
}

impl From<String> for BridgeError {
    fn from(s: String) -> Self {
        BridgeError::General(s)
    }
}

impl From<&str> for BridgeError {
    fn from(s: &str) -> Self {
        BridgeError::General(s.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::InvalidConfig.to_string(), "INVALID_CONFIG");
        assert_eq!(
            ErrorCode::NativeDestroyFailed.to_string(),
            "NATIVE_DESTROY_FAILED"
        );
    }

    #[test]
    fn test_invalid_handle_error() {
        let err = FfiError::invalid_handle(-5);
        assert_eq!(err.code, ErrorCode::InvalidConfig);
        assert!(err.message.contains("-5"));
    }

    #[test]
    fn test_resource_disposed_error() {
        let err = FfiError::resource_disposed(ResourceKind::Wallet);
        assert_eq!(err.code, ErrorCode::ResourceDisposed);
        assert!(err.message.contains("wallet"));
    }

    #[test]
    fn test_error_with_stack_and_context() {
        let err = FfiError::buffer_cleared("to_hex")
            .with_stack("at secure.rs:120")
            .with_context(serde_json::json!({ "length": 32 }));
        assert!(err.stack.is_some());
        assert!(err.context.is_some());
    }

    #[test]
    fn test_error_serialization() {
        let err = FfiError::buffer_cleared("copy");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("BUFFER_CLEARED"));
    }

    #[test]
    fn test_bridge_error_conversion() {
        let ffi_err = FfiError::resource_disposed(ResourceKind::Transaction);
        let bridge_err = BridgeError::Ffi(ffi_err);
        assert_eq!(bridge_err.code(), ErrorCode::ResourceDisposed);
        assert_eq!(bridge_err.to_ffi_error().code, ErrorCode::ResourceDisposed);
    }
}
