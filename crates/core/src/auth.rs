//! Credential and attachment boundaries consumed by the chat pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AuthError, UploadError};

/// A bearer credential and the moment it must no longer be used.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty() && self.expires_at > now
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of bearer credentials for the completion and upload endpoints.
///
/// Implementations cache the token and refresh it transparently when it is
/// absent or expired.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// Uploads a local file once and hands back its remote file id.
#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn file_id(&self, access_token: &str, path: &Path) -> Result<String, UploadError>;
}
