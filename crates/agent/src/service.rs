//! One chat turn, end to end.
//!
//! token → attachment → load history → seed → [`CompletionEngine`] →
//! append reply → re-shape → save.

use std::path::PathBuf;
use std::sync::Arc;

use chatbridge_core::auth::{FileUploader, TokenSource};
use chatbridge_core::error::{Error, Result, UploadError};
use chatbridge_core::memory::HistoryStore;
use chatbridge_core::message::{History, Message, SessionId};
use chatbridge_core::provider::Usage;
use tracing::{info, instrument, warn};

use crate::context::{HISTORY_TTL, force_system_prompt, hard_clamp, soft_trim};
use crate::engine::{CompletionEngine, TurnContext};

/// What the caller gets back for one turn.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    pub session_id: SessionId,
    pub usage: Usage,
    /// Remote file ids attached to the request.
    pub attachments_used: Vec<String>,
    pub attempts: usize,
}

pub struct ChatService {
    tokens: Arc<dyn TokenSource>,
    uploader: Arc<dyn FileUploader>,
    store: Arc<dyn HistoryStore>,
    engine: CompletionEngine,
    attachment: Option<PathBuf>,
}

impl ChatService {
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        uploader: Arc<dyn FileUploader>,
        store: Arc<dyn HistoryStore>,
        engine: CompletionEngine,
    ) -> Self {
        Self {
            tokens,
            uploader,
            store,
            engine,
            attachment: None,
        }
    }

    /// Attach this file to every request.
    pub fn with_attachment(mut self, path: Option<PathBuf>) -> Self {
        self.attachment = path;
        self
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    fn pin(&self, history: History) -> History {
        let prompt = self.engine.system_prompt();
        if prompt.is_empty() {
            history
        } else {
            force_system_prompt(history, prompt)
        }
    }

    fn reshape(&self, history: History) -> History {
        let limits = self.engine.limits();
        self.pin(soft_trim(hard_clamp(history, limits), limits))
    }

    async fn attachments(&self, access_token: &str) -> Result<Vec<String>> {
        let Some(path) = &self.attachment else {
            return Ok(Vec::new());
        };
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(UploadError::FileNotFound(path.clone()).into());
        }
        let id = self.uploader.file_id(access_token, path).await?;
        Ok(vec![id])
    }

    async fn load_history(&self, session_id: &SessionId) -> History {
        match self.store.load(session_id).await {
            Ok(Some(record)) => record.history,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(session = %session_id, error = %e, "Failed to load history, starting fresh");
                Vec::new()
            }
        }
    }

    /// Run one turn for `session_id`.
    #[instrument(skip(self, message), fields(store = self.store.name()))]
    pub async fn chat(&self, session_id: &SessionId, message: &str) -> Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::InvalidInput("message must not be empty".into()));
        }

        let access_token = self.tokens.access_token().await?;
        let attachments = self.attachments(&access_token).await?;

        let mut history = self.load_history(session_id).await;
        let prompt = self.engine.system_prompt();
        if !prompt.is_empty() && !history.first().is_some_and(Message::is_system) {
            history.insert(0, Message::system(prompt));
        }
        history.push(Message::user(message));
        let history = self.pin(history);

        let ctx = TurnContext {
            access_token: &access_token,
            session_id,
            attachments: &attachments,
        };
        let completion = self.engine.complete(&ctx, history).await?;

        let mut retained = completion.retained;
        retained.push(Message::assistant(completion.text.clone()));
        let retained = self.reshape(retained);

        if let Err(e) = self.store.save(session_id, retained, HISTORY_TTL).await {
            warn!(session = %session_id, error = %e, "Failed to save history");
        }

        info!(
            session = %session_id,
            attempts = completion.attempts,
            minimal = completion.minimal,
            "Chat turn completed"
        );

        Ok(ChatReply {
            text: completion.text,
            session_id: session_id.clone(),
            usage: completion.usage,
            attachments_used: attachments,
            attempts: completion.attempts,
        })
    }
}
