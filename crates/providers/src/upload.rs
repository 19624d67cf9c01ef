//! File upload with a file-id cache keyed by path and modification time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chatbridge_config::AppConfig;
use chatbridge_core::auth::FileUploader;
use chatbridge_core::error::{Result, UploadError};
use reqwest::multipart::{Form, Part};
use tracing::{debug, info, warn};

use crate::http::{build_client, endpoint, json_or_empty};

const FILES_PATH: &str = "/api/v1/files";
const PURPOSE: &str = "general";

pub struct CachedFileUploader {
    api_base: String,
    client: reqwest::Client,
    ids: Mutex<HashMap<PathBuf, (SystemTime, String)>>,
}

impl CachedFileUploader {
    pub fn new(
        api_base: impl Into<String>,
        ca_bundle: Option<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            api_base: api_base.into(),
            client: build_client(ca_bundle.as_deref(), timeout)?,
            ids: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.api_base.clone(),
            config.ca_bundle.clone(),
            Duration::from_secs(config.timeouts.upload_secs),
        )
    }

    fn cached(&self, path: &Path, mtime: SystemTime) -> Option<String> {
        let ids = self.ids.lock().ok()?;
        ids.get(path)
            .filter(|(seen, _)| *seen == mtime)
            .map(|(_, id)| id.clone())
    }

    fn remember(&self, path: &Path, mtime: SystemTime, id: &str) {
        match self.ids.lock() {
            Ok(mut ids) => {
                ids.insert(path.to_path_buf(), (mtime, id.to_string()));
            }
            Err(_) => warn!("File id cache is poisoned, not caching"),
        }
    }

    async fn upload(&self, access_token: &str, path: &Path) -> std::result::Result<String, UploadError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| UploadError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("purpose", PURPOSE);

        let response = self
            .client
            .post(endpoint(&self.api_base, FILES_PATH))
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;
        let body = json_or_empty(&bytes);

        match body["id"].as_str().filter(|id| !id.is_empty()) {
            Some(id) if (200..300).contains(&status) => Ok(id.to_string()),
            _ => Err(UploadError::Rejected {
                status_code: status,
                body,
            }),
        }
    }
}

#[async_trait]
impl FileUploader for CachedFileUploader {
    async fn file_id(&self, access_token: &str, path: &Path) -> std::result::Result<String, UploadError> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta,
            _ => return Err(UploadError::FileNotFound(path.to_path_buf())),
        };
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        if let Some(id) = self.cached(path, mtime) {
            debug!(path = %path.display(), file_id = %id, "Reusing uploaded file");
            return Ok(id);
        }

        let id = self.upload(access_token, path).await?;
        info!(path = %path.display(), file_id = %id, "Uploaded attachment");
        self.remember(path, mtime, &id);
        Ok(id)
    }
}
