//! Error types for the registration and dispatch runtime.

use serde::{Deserialize, Serialize};

/// Error payload reported by an isolated context.
///
/// Carried verbatim across the message channel and surfaced to callers as
/// [`Error::Remote`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl RemotePayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl std::fmt::Display for RemotePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&Error> for RemotePayload {
    fn from(err: &Error) -> Self {
        match err {
            Error::Remote(payload) => payload.clone(),
            other => RemotePayload::new(other.to_string()),
        }
    }
}

/// Errors raised while loading, registering or calling modules.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Operation dropped: {0}")]
    OperationDropped(String),

    #[error("Menu returned no items: {0}")]
    EmptyMenu(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Method {method} not found on service {service}")]
    MethodNotFound { service: String, method: String },

    #[error("Synchronous call to remote service {0}")]
    SyncOnRemote(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Extension not found: {0}")]
    ExtensionNotFound(String),

    #[error("Remote error: {0}")]
    Remote(RemotePayload),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Host error: {0}")]
    Host(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MethodNotFound {
            service: "extension_0_pen".to_string(),
            method: "penDown".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Method penDown not found on service extension_0_pen"
        );

        let err = Error::DeviceNotFound("boardA".to_string());
        assert!(err.to_string().contains("boardA"));
    }

    #[test]
    fn test_remote_payload_roundtrips_through_error() {
        let payload = RemotePayload::new("boom").with_detail(serde_json::json!({"line": 3}));
        let err = Error::Remote(payload.clone());
        assert_eq!(RemotePayload::from(&err), payload);

        let other = Error::ExecutionFailed("bad pin".to_string());
        assert_eq!(RemotePayload::from(&other).message, "Execution failed: bad pin");
    }
}
