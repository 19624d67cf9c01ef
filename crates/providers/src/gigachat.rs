//! Chat completion client for the GigaChat API.
//!
//! The backend reports every HTTP answer as a [`RawCompletion`], whatever the
//! status; deciding what a status means is the engine's job. Only failures
//! with no HTTP answer at all (connect errors, timeouts) become errors.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chatbridge_config::AppConfig;
use chatbridge_core::error::{ProviderError, Result};
use chatbridge_core::message::{Message, Role};
use chatbridge_core::provider::{CompletionBackend, CompletionRequest, RawCompletion};
use serde::Serialize;
use tracing::{debug, warn};

use crate::http::{build_client, endpoint, json_or_empty};

const COMPLETIONS_PATH: &str = "/api/v1/chat/completions";

pub struct GigaChatBackend {
    api_base: String,
    client: reqwest::Client,
}

impl GigaChatBackend {
    pub fn new(
        api_base: impl Into<String>,
        ca_bundle: Option<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            api_base: api_base.into(),
            client: build_client(ca_bundle.as_deref(), timeout)?,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.api_base.clone(),
            config.ca_bundle.clone(),
            Duration::from_secs(config.timeouts.completion_secs),
        )
    }

    /// Attachments ride on the last user message only.
    fn to_api_messages<'a>(
        messages: &'a [Message],
        attachments: &'a [String],
    ) -> Vec<ApiMessage<'a>> {
        let carrier = if attachments.is_empty() {
            None
        } else {
            messages.iter().rposition(|m| m.role == Role::User)
        };

        messages
            .iter()
            .enumerate()
            .map(|(i, m)| ApiMessage {
                role: m.role.as_str(),
                content: &m.content,
                attachments: (carrier == Some(i)).then_some(attachments),
            })
            .collect()
    }
}

#[async_trait]
impl CompletionBackend for GigaChatBackend {
    fn name(&self) -> &str {
        "gigachat"
    }

    async fn send(
        &self,
        access_token: &str,
        request: &CompletionRequest,
    ) -> std::result::Result<RawCompletion, ProviderError> {
        let body = ApiRequest {
            model: &request.model,
            messages: Self::to_api_messages(&request.messages, &request.attachments),
            profanity_check: request.profanity_check,
        };
        let request_id = uuid::Uuid::new_v4();

        debug!(
            model = %request.model,
            request_id = %request_id,
            messages = body.messages.len(),
            attachments = request.attachments.len(),
            "Posting chat completion"
        );

        let response = self
            .client
            .post(endpoint(&self.api_base, COMPLETIONS_PATH))
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .header("X-Request-ID", request_id.to_string())
            .header("X-Session-ID", request.session_id.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.is_timeout(), e.to_string()))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::transport(e.is_timeout(), e.to_string()))?;

        if !(200..300).contains(&status) {
            warn!(status, request_id = %request_id, "Completion endpoint returned an error status");
        }

        Ok(RawCompletion::new(status, json_or_empty(&bytes)))
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    profanity_check: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachments: Option<&'a [String]>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbridge_core::message::SessionId;
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(messages: Vec<Message>, attachments: Vec<String>) -> CompletionRequest {
        CompletionRequest {
            model: "GigaChat-2-Pro".into(),
            messages,
            attachments,
            profanity_check: true,
            session_id: SessionId::new(),
        }
    }

    fn backend(server: &MockServer, timeout: Duration) -> GigaChatBackend {
        GigaChatBackend::new(server.uri(), None, timeout).unwrap()
    }

    #[test]
    fn attachments_go_on_the_last_user_message() {
        let messages = vec![
            Message::system("S"),
            Message::user("first"),
            Message::assistant("a"),
            Message::user("second"),
        ];
        let files = vec!["f1".to_string()];
        let api = GigaChatBackend::to_api_messages(&messages, &files);

        let json = serde_json::to_value(&api).unwrap();
        assert!(json[1].get("attachments").is_none());
        assert_eq!(json[3]["attachments"], json!(["f1"]));
        assert_eq!(json[0]["role"], "system");
    }

    #[test]
    fn no_attachments_no_field() {
        let messages = vec![Message::user("hi")];
        let json = serde_json::to_value(GigaChatBackend::to_api_messages(&messages, &[])).unwrap();
        assert!(json[0].get("attachments").is_none());
    }

    #[tokio::test]
    async fn sends_headers_and_body() {
        let server = MockServer::start().await;
        let req = request(vec![Message::system("S"), Message::user("hi")], vec![]);

        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("Authorization", "Bearer tok"))
            .and(header("Accept", "application/json"))
            .and(header("X-Session-ID", req.session_id.as_str()))
            .and(header_exists("X-Request-ID"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let raw = backend(&server, Duration::from_secs(5))
            .send("tok", &req)
            .await
            .unwrap();
        assert_eq!(raw.status, 200);
        assert_eq!(raw.text().as_deref(), Some("Hello!"));

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["model"], "GigaChat-2-Pro");
        assert_eq!(body["profanity_check"], true);
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[tokio::test]
    async fn error_status_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(413).set_body_json(json!({"message": "too long"})))
            .mount(&server)
            .await;

        let raw = backend(&server, Duration::from_secs(5))
            .send("tok", &request(vec![Message::user("hi")], vec![]))
            .await
            .unwrap();
        assert_eq!(raw.status, 413);
        assert_eq!(raw.body["message"], "too long");
    }

    #[tokio::test]
    async fn non_json_body_is_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("<html>busy</html>"))
            .mount(&server)
            .await;

        let raw = backend(&server, Duration::from_secs(5))
            .send("tok", &request(vec![Message::user("hi")], vec![]))
            .await
            .unwrap();
        assert_eq!(raw.status, 503);
        assert_eq!(raw.body, json!({}));
    }

    #[tokio::test]
    async fn slow_upstream_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let err = backend(&server, Duration::from_millis(100))
            .send("tok", &request(vec![Message::user("hi")], vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let backend = GigaChatBackend::new("http://127.0.0.1:1", None, Duration::from_secs(2)).unwrap();
        let err = backend
            .send("tok", &request(vec![Message::user("hi")], vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }
}
