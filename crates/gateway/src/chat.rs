//! `POST /chat`: one message in, one reply out.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chatbridge_agent::ChatReply;
use chatbridge_core::error::{AuthError, Error, ProviderError, UploadError};
use chatbridge_core::message::SessionId;
use chatbridge_core::provider::Usage;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::SharedState;

pub const SESSION_HEADER: &str = "x-session-id";
pub const SESSION_COOKIE: &str = "x_session_id";

/// Lifetime of a minted session cookie (7 days).
const SESSION_COOKIE_MAX_AGE: u64 = 7 * 24 * 3600;

#[derive(Debug, Default)]
pub struct ChatPayload {
    pub message: Option<String>,
    pub session_id: Option<String>,
}

impl ChatPayload {
    /// Read `message` and `sessionId` from a request body. A malformed or
    /// non-object body reads as an empty payload; scalar fields are taken
    /// as their text form.
    pub fn from_body(body: &[u8]) -> Self {
        let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        Self {
            message: value.get("message").and_then(scalar_text),
            session_id: value.get("sessionId").and_then(scalar_text),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("1".into()),
        Value::Bool(false) => Some(String::new()),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub usage: Usage,
    pub cached_prompt_tokens: u64,
    pub attachments_used: Vec<String>,
}

impl From<ChatReply> for ChatResponse {
    fn from(reply: ChatReply) -> Self {
        Self {
            cached_prompt_tokens: reply.usage.precached_prompt_tokens,
            response: reply.text,
            session_id: reply.session_id.as_str().to_string(),
            usage: reply.usage,
            attachments_used: reply.attachments_used,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

/// A domain error on its way out as JSON.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

/// HTTP status for each failure class.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::Auth(AuthError::MissingCredentials) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Auth(_) => StatusCode::BAD_GATEWAY,
        Error::Upload(UploadError::FileNotFound(_) | UploadError::Read { .. }) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Error::Upload(_) => StatusCode::BAD_GATEWAY,
        Error::Provider(ProviderError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        Error::Provider(_) => StatusCode::BAD_GATEWAY,
        Error::Store(_) | Error::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "Chat request failed");
        }
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
            details: self.0.details(),
        };
        (status, Json(body)).into_response()
    }
}

/// Any method other than POST on `/chat`.
pub async fn method_not_allowed() -> Response {
    let body = ErrorBody {
        error: "method_not_allowed",
        message: "Method Not Allowed".into(),
        details: None,
    };
    (StatusCode::METHOD_NOT_ALLOWED, Json(body)).into_response()
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim())
}

/// The first non-empty source wins: body, header, cookie. When that value is
/// not a UUID, a fresh id is minted and the flag is `true`.
pub fn resolve_session(body_sid: Option<&str>, headers: &HeaderMap) -> (SessionId, bool) {
    let candidate = body_sid
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            headers
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|s| !s.trim().is_empty())
        })
        .or_else(|| cookie_value(headers, SESSION_COOKIE).filter(|s| !s.is_empty()));

    match candidate.and_then(SessionId::parse) {
        Some(sid) => (sid, false),
        None => (SessionId::new(), true),
    }
}

fn session_cookie(sid: &SessionId) -> String {
    format!(
        "{SESSION_COOKIE}={sid}; Max-Age={SESSION_COOKIE_MAX_AGE}; Path=/; Secure; SameSite=Lax"
    )
}

pub async fn chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload = ChatPayload::from_body(&body);
    let (session_id, minted) = resolve_session(payload.session_id.as_deref(), &headers);

    let message = payload.message.as_deref().map(str::trim).unwrap_or_default();
    let mut response = if message.is_empty() {
        warn!(session = %session_id, "Rejected chat request without a message");
        ApiError(Error::InvalidInput("Field \"message\" is required".into())).into_response()
    } else {
        info!(session = %session_id, minted, message_len = message.chars().count(), "Chat request received");
        match state.service.chat(&session_id, message).await {
            Ok(reply) => Json(ChatResponse::from(reply)).into_response(),
            Err(e) => ApiError(e).into_response(),
        }
    };

    if minted {
        if let Ok(value) = HeaderValue::from_str(&session_cookie(&session_id)) {
            response.headers_mut().insert(SET_COOKIE, value);
        }
    }
    response
}
