//! Error types for the chatbridge domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant; the top-level [`Error`]
//! carries a machine-readable kind and optional structured details so the
//! HTTP surface can report failures without leaking internals.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all chatbridge operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Caller input ---
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // --- Credential errors ---
    #[error("Credential error: {0}")]
    Auth(#[from] AuthError),

    // --- Completion endpoint errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Attachment errors ---
    #[error("Attachment error: {0}")]
    Upload(#[from] UploadError),

    // --- History storage errors ---
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Stable, machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::Auth(_) => "credentials",
            Error::Provider(ProviderError::Upstream { .. }) => "upstream",
            Error::Provider(_) => "transport",
            Error::Upload(_) => "attachment",
            Error::Store(_) => "storage",
            Error::Config { .. } => "config",
        }
    }

    /// Operator-facing details (upstream status/body, offending path).
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::Provider(ProviderError::Upstream { status_code, body }) => Some(
                serde_json::json!({ "status": status_code, "body": body }),
            ),
            Error::Auth(AuthError::Rejected { status_code, body }) => Some(
                serde_json::json!({ "status": status_code, "body": body }),
            ),
            Error::Upload(UploadError::Rejected { status_code, body }) => Some(
                serde_json::json!({ "status": status_code, "body": body }),
            ),
            Error::Upload(UploadError::FileNotFound(path)) => {
                Some(serde_json::json!({ "path": path.display().to_string() }))
            }
            _ => None,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The completion endpoint answered, but not with a usable completion,
    /// and no further attempts remain.
    #[error("Upstream request failed (status: {status_code})")]
    Upstream {
        status_code: u16,
        body: serde_json::Value,
    },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Map a reqwest transport failure. A timeout carries no status code,
    /// so it is never eligible for the context-shrinking retries.
    pub fn transport(timed_out: bool, message: impl Into<String>) -> Self {
        if timed_out {
            ProviderError::Timeout(message.into())
        } else {
            ProviderError::Network(message.into())
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Client credentials are not configured")]
    MissingCredentials,

    #[error("Token endpoint rejected the request (status: {status_code})")]
    Rejected {
        status_code: u16,
        body: serde_json::Value,
    },

    #[error("Token endpoint unreachable: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum UploadError {
    #[error("Attachment file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read attachment {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("Upload rejected (status: {status_code})")]
    Rejected {
        status_code: u16,
        body: serde_json::Value,
    },

    #[error("Upload failed: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt session record: {0}")]
    Corrupt(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_carries_status_and_body() {
        let err = Error::Provider(ProviderError::Upstream {
            status_code: 413,
            body: serde_json::json!({"message": "context too large"}),
        });
        assert_eq!(err.kind(), "upstream");
        let details = err.details().unwrap();
        assert_eq!(details["status"], 413);
        assert_eq!(details["body"]["message"], "context too large");
    }

    #[test]
    fn timeout_is_a_transport_error() {
        let err = Error::Provider(ProviderError::transport(true, "after 60s"));
        assert_eq!(err.kind(), "transport");
        assert!(err.details().is_none());
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn missing_attachment_reports_path() {
        let err = Error::Upload(UploadError::FileNotFound(PathBuf::from("/srv/kb.pdf")));
        assert_eq!(err.kind(), "attachment");
        assert_eq!(err.details().unwrap()["path"], "/srv/kb.pdf");
    }

    #[test]
    fn store_and_config_errors_have_no_details() {
        let err = Error::from(StoreError::Corrupt("chat_hist_x.json".into()));
        assert_eq!(err.kind(), "storage");
        assert!(err.details().is_none());
        assert!(err.to_string().contains("Corrupt session record"));

        let err = Error::Config { message: "bad ca bundle".into() };
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn credential_errors_have_their_own_kind() {
        let err = Error::Auth(AuthError::MissingCredentials);
        assert_eq!(err.kind(), "credentials");
        assert!(err.to_string().contains("not configured"));
    }
}
