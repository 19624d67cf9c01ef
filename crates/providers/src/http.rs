//! Shared reqwest client construction.

use std::path::Path;
use std::time::Duration;

use chatbridge_core::error::{Error, Result};

/// Build a client with the given timeout, trusting `ca_bundle` in addition
/// to the built-in roots when one is configured.
pub fn build_client(ca_bundle: Option<&Path>, timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);

    if let Some(path) = ca_bundle {
        let pem = std::fs::read(path).map_err(|e| Error::Config {
            message: format!("Failed to read CA bundle {}: {e}", path.display()),
        })?;
        let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| Error::Config {
            message: format!("Invalid CA bundle {}: {e}", path.display()),
        })?;
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    builder.build().map_err(|e| Error::Config {
        message: format!("Failed to create HTTP client: {e}"),
    })
}

/// Join a base URL and an absolute API path without doubling slashes.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Parse a response body as JSON, falling back to an empty object.
pub(crate) fn json_or_empty(bytes: &[u8]) -> serde_json::Value {
    serde_json::from_slice(bytes).unwrap_or_else(|_| serde_json::json!({}))
}
