//! Completion backend trait: the abstraction over the remote chat endpoint.
//!
//! A backend sends one ordered message list upstream and reports back the raw
//! status code and JSON body. It does not interpret the status: routing
//! decisions (success, context error, terminal failure) belong to the engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::message::{Message, SessionId};

/// One outbound completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model identifier
    pub model: String,

    /// The conversation slice to send, oldest first
    pub messages: Vec<Message>,

    /// Uploaded file ids, attached to the last user message on the wire
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,

    /// Upstream content-safety check
    #[serde(default)]
    pub profanity_check: bool,

    /// Session the request belongs to (forwarded for upstream prompt caching)
    pub session_id: SessionId,
}

/// Status and parsed body of a completion call that reached the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCompletion {
    pub status: u16,
    pub body: Value,
}

impl RawCompletion {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `choices[0].message.content`, when present and non-null.
    pub fn text(&self) -> Option<String> {
        match self.body.pointer("/choices/0/message/content") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }

    pub fn usage(&self) -> Usage {
        Usage::from_body(&self.body)
    }
}

/// Token usage reported by the completion endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    /// Prompt tokens served from the upstream cache
    pub precached_prompt_tokens: u64,
}

impl Usage {
    /// Read usage from a response body.
    ///
    /// The cached-prompt count may live under `usage.precached_prompt_tokens`
    /// or at the top level; the nested location wins, absent means 0.
    pub fn from_body(body: &Value) -> Self {
        let usage = body.get("usage");
        let field = |name: &str| usage.and_then(|u| u.get(name)).and_then(Value::as_u64);

        let precached_prompt_tokens = field("precached_prompt_tokens")
            .or_else(|| body.get("precached_prompt_tokens").and_then(Value::as_u64))
            .unwrap_or(0);

        Self {
            prompt_tokens: field("prompt_tokens"),
            completion_tokens: field("completion_tokens"),
            total_tokens: field("total_tokens"),
            precached_prompt_tokens,
        }
    }
}

/// The remote completion endpoint.
///
/// `Ok` means the endpoint answered with *some* status. Transport failures
/// (connect errors, timeouts with no status) come back as `Err` and are never
/// retried by the engine.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Send one request using the given bearer credential.
    async fn send(
        &self,
        access_token: &str,
        request: &CompletionRequest,
    ) -> std::result::Result<RawCompletion, ProviderError>;
}
