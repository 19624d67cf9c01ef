//! The completion request engine.
//!
//! One user turn is at most [`MAX_ATTEMPTS`] upstream calls, driven by a
//! small state machine:
//!
//! ```text
//! Attempting(1) ──ok──────────────────────────────▶ Done(Ok)
//!      │ retryable, > 2 messages
//!      ▼
//! Degrading ──▶ Attempting(2) ──ok──────────────────▶ Done(Ok)
//!      ▲            │ retryable
//!      │            ▼
//! retryable,   MinimalFallback ──ok─────────────────▶ Done(Ok)
//! ≤ 2 messages      └──────────failure──────────────▶ Done(Err)
//! ```
//!
//! Any non-retryable status outside the fallback ends the turn at once with
//! the upstream status and body. Transport failures (no status at all) are
//! returned immediately and never retried.

use std::sync::Arc;

use chatbridge_core::error::ProviderError;
use chatbridge_core::message::{History, Message, Role, SessionId};
use chatbridge_core::provider::{CompletionBackend, CompletionRequest, RawCompletion, Usage};
use tracing::{debug, info, warn};

use crate::context::{
    HistoryLimits, clamp_content, drop_oldest_pair, force_system_prompt, hard_clamp, soft_trim,
};

/// Upper bound on upstream calls per user turn, fallback included.
pub const MAX_ATTEMPTS: usize = 3;

/// Statuses the endpoint uses for "context too large" or "busy".
pub const RETRYABLE_STATUSES: [u16; 5] = [400, 413, 422, 500, 503];

/// The per-turn values every upstream call carries.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext<'a> {
    pub access_token: &'a str,
    pub session_id: &'a SessionId,
    pub attachments: &'a [String],
}

/// A successful turn.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
    /// The last full (non-minimal) history that was sent, after any
    /// degradation. The caller appends the reply to this and stores it.
    pub retained: History,
    /// Upstream calls made, at most [`MAX_ATTEMPTS`].
    pub attempts: usize,
    /// Whether the reply came from the minimal fallback request.
    pub minimal: bool,
}

/// How a single upstream answer routes the state machine.
#[derive(Debug)]
enum Outcome {
    Success { text: String, usage: Usage },
    Retryable(RawCompletion),
    Terminal(RawCompletion),
}

fn classify(raw: RawCompletion) -> Outcome {
    if raw.is_success_status() {
        return match raw.text() {
            Some(text) => Outcome::Success {
                usage: raw.usage(),
                text,
            },
            // 2xx without a completion: nothing usable came back, shrink and retry.
            None => Outcome::Retryable(raw),
        };
    }

    if RETRYABLE_STATUSES.contains(&raw.status) {
        Outcome::Retryable(raw)
    } else {
        Outcome::Terminal(raw)
    }
}

fn upstream_error(raw: RawCompletion) -> ProviderError {
    ProviderError::Upstream {
        status_code: raw.status,
        body: raw.body,
    }
}

#[derive(Debug)]
enum State {
    Attempting { attempt: usize, history: History },
    Degrading { attempt: usize, history: History },
    MinimalFallback { last: RawCompletion, retained: History },
    Done(Result<Completion, ProviderError>),
}

/// Sends a session's history upstream, shrinking it on context errors.
pub struct CompletionEngine {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    system_prompt: String,
    limits: HistoryLimits,
}

impl CompletionEngine {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            system_prompt: system_prompt.into(),
            limits: HistoryLimits::default(),
        }
    }

    /// Override the history bounds (tests use small ones).
    pub fn with_limits(mut self, limits: HistoryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &HistoryLimits {
        &self.limits
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Soft trim, then pin the configured prompt when there is one.
    fn shape(&self, history: History) -> History {
        let trimmed = soft_trim(history, &self.limits);
        if self.system_prompt.is_empty() {
            trimmed
        } else {
            force_system_prompt(trimmed, &self.system_prompt)
        }
    }

    /// `[system, last user]`, or `None` when the turn has no user message.
    fn minimal_messages(&self, last_user: Option<&Message>) -> Option<Vec<Message>> {
        let user = last_user?;
        Some(vec![
            Message::system(self.system_prompt.clone()),
            Message {
                role: Role::User,
                content: clamp_content(&user.content, self.limits.max_message_chars),
                created_at: user.created_at,
            },
        ])
    }

    async fn send(
        &self,
        ctx: &TurnContext<'_>,
        messages: Vec<Message>,
    ) -> Result<RawCompletion, ProviderError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
            attachments: ctx.attachments.to_vec(),
            profanity_check: true,
            session_id: ctx.session_id.clone(),
        };
        debug!(
            backend = self.backend.name(),
            session = %ctx.session_id,
            messages = request.messages.len(),
            "Sending completion request"
        );
        self.backend.send(ctx.access_token, &request).await
    }

    /// Run one user turn against the backend.
    pub async fn complete(
        &self,
        ctx: &TurnContext<'_>,
        history: History,
    ) -> Result<Completion, ProviderError> {
        let clamped = hard_clamp(history, &self.limits);
        let last_user = clamped.iter().rev().find(|m| m.role == Role::User).cloned();

        let mut calls = 0usize;
        let mut state = State::Attempting {
            attempt: 1,
            history: self.shape(clamped),
        };

        loop {
            state = match state {
                State::Attempting { attempt, history } => {
                    calls += 1;
                    let raw = self.send(ctx, history.clone()).await?;
                    match classify(raw) {
                        Outcome::Success { text, usage } => State::Done(Ok(Completion {
                            text,
                            usage,
                            retained: history,
                            attempts: calls,
                            minimal: false,
                        })),
                        Outcome::Retryable(raw) if attempt == 1 && history.len() > 2 => {
                            warn!(
                                session = %ctx.session_id,
                                attempt,
                                status = raw.status,
                                messages = history.len(),
                                "Completion rejected, degrading history"
                            );
                            State::Degrading { attempt, history }
                        }
                        Outcome::Retryable(raw) => {
                            warn!(
                                session = %ctx.session_id,
                                attempt,
                                status = raw.status,
                                "Completion rejected, falling back to minimal request"
                            );
                            State::MinimalFallback {
                                last: raw,
                                retained: history,
                            }
                        }
                        Outcome::Terminal(raw) => {
                            warn!(
                                session = %ctx.session_id,
                                attempt,
                                status = raw.status,
                                "Completion failed with non-retryable status"
                            );
                            State::Done(Err(upstream_error(raw)))
                        }
                    }
                }

                State::Degrading { attempt, history } => State::Attempting {
                    attempt: attempt + 1,
                    history: self.shape(drop_oldest_pair(history)),
                },

                State::MinimalFallback { last, retained } => {
                    match self.minimal_messages(last_user.as_ref()) {
                        None => State::Done(Err(upstream_error(last))),
                        Some(messages) => {
                            calls += 1;
                            info!(session = %ctx.session_id, attempt = calls, "Sending minimal fallback request");
                            match classify(self.send(ctx, messages).await?) {
                                Outcome::Success { text, usage } => State::Done(Ok(Completion {
                                    text,
                                    usage,
                                    retained,
                                    attempts: calls,
                                    minimal: true,
                                })),
                                Outcome::Retryable(raw) | Outcome::Terminal(raw) => {
                                    State::Done(Err(upstream_error(raw)))
                                }
                            }
                        }
                    }
                }

                State::Done(result) => {
                    debug_assert!(calls <= MAX_ATTEMPTS);
                    return result;
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TRUNCATION_MARKER;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// A backend that answers from a script and records every request.
    struct ScriptedBackend {
        script: Mutex<Vec<Result<RawCompletion, ProviderError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<RawCompletion, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().rev().collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(
            &self,
            _access_token: &str,
            request: &CompletionRequest,
        ) -> Result<RawCompletion, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(RawCompletion::new(503, json!({"message": "script exhausted"}))))
        }
    }

    fn ok(text: &str) -> Result<RawCompletion, ProviderError> {
        Ok(RawCompletion::new(
            200,
            json!({
                "choices": [{"message": {"role": "assistant", "content": text}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            }),
        ))
    }

    fn status(code: u16) -> Result<RawCompletion, ProviderError> {
        Ok(RawCompletion::new(code, json!({"status": code, "message": "nope"})))
    }

    fn engine(backend: Arc<ScriptedBackend>) -> CompletionEngine {
        CompletionEngine::new(backend, "test-model", "S")
    }

    async fn run(
        engine: &CompletionEngine,
        history: History,
    ) -> Result<Completion, ProviderError> {
        let sid = SessionId::new();
        let attachments = vec!["file-1".to_string()];
        let ctx = TurnContext {
            access_token: "token",
            session_id: &sid,
            attachments: &attachments,
        };
        engine.complete(&ctx, history).await
    }

    fn two_pairs_and_question() -> History {
        vec![
            Message::system("S"),
            Message::user("u1"),
            Message::assistant("a1"),
            Message::user("u2"),
            Message::assistant("a2"),
            Message::user("u3"),
        ]
    }

    fn contents(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn classification_by_status() {
        for code in RETRYABLE_STATUSES {
            assert!(matches!(
                classify(RawCompletion::new(code, json!({}))),
                Outcome::Retryable(_)
            ));
        }
        for code in [401, 403, 404, 429, 502] {
            assert!(matches!(
                classify(RawCompletion::new(code, json!({}))),
                Outcome::Terminal(_)
            ));
        }
        assert!(matches!(
            classify(RawCompletion::new(200, json!({"choices": []}))),
            Outcome::Retryable(_)
        ));
    }

    #[tokio::test]
    async fn first_call_success() {
        let backend = ScriptedBackend::new(vec![ok("Hello!")]);
        let engine = engine(backend.clone());

        let done = run(&engine, vec![Message::system("S"), Message::user("hi")])
            .await
            .unwrap();

        assert_eq!(done.text, "Hello!");
        assert_eq!(done.attempts, 1);
        assert!(!done.minimal);
        assert_eq!(done.usage.total_tokens, Some(15));
        assert_eq!(done.usage.precached_prompt_tokens, 0);

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "test-model");
        assert!(requests[0].profanity_check);
        assert_eq!(requests[0].attachments, ["file-1"]);
        assert_eq!(contents(&requests[0].messages), ["S", "hi"]);
    }

    #[tokio::test]
    async fn stale_system_prompt_is_replaced_before_sending() {
        let backend = ScriptedBackend::new(vec![ok("ok")]);
        let engine = engine(backend.clone());

        run(
            &engine,
            vec![Message::system("old"), Message::user("hi"), Message::system("dup")],
        )
        .await
        .unwrap();

        let sent = &backend.requests()[0].messages;
        assert_eq!(contents(sent), ["S", "hi"]);
    }

    #[tokio::test]
    async fn context_error_degrades_then_succeeds() {
        let backend = ScriptedBackend::new(vec![status(413), ok("second")]);
        let engine = engine(backend.clone());

        let done = run(&engine, two_pairs_and_question()).await.unwrap();

        assert_eq!(done.text, "second");
        assert_eq!(done.attempts, 2);
        let requests = backend.requests();
        assert_eq!(contents(&requests[0].messages), ["S", "u1", "a1", "u2", "a2", "u3"]);
        assert_eq!(contents(&requests[1].messages), ["S", "u2", "a2", "u3"]);
        assert_eq!(contents(&done.retained), ["S", "u2", "a2", "u3"]);
    }

    #[tokio::test]
    async fn two_messages_skip_straight_to_minimal_fallback() {
        let backend = ScriptedBackend::new(vec![status(500), ok("fallback")]);
        let engine = engine(backend.clone());

        let done = run(&engine, vec![Message::system("S"), Message::user("hi")])
            .await
            .unwrap();

        assert_eq!(done.text, "fallback");
        assert!(done.minimal);
        assert_eq!(done.attempts, 2);
        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(contents(&requests[1].messages), ["S", "hi"]);
        assert_eq!(requests[1].attachments, ["file-1"]);
    }

    #[tokio::test]
    async fn all_attempts_fail_with_last_status() {
        let backend = ScriptedBackend::new(vec![status(413), status(503), status(500)]);
        let engine = engine(backend.clone());

        let err = run(&engine, two_pairs_and_question()).await.unwrap_err();

        match err {
            ProviderError::Upstream { status_code, body } => {
                assert_eq!(status_code, 500);
                assert_eq!(body["status"], 500);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let requests = backend.requests();
        assert_eq!(requests.len(), MAX_ATTEMPTS);
        assert_eq!(contents(&requests[2].messages), ["S", "u3"]);
    }

    #[tokio::test]
    async fn never_more_than_three_calls() {
        // A long history could be degraded many times; the engine must stop.
        let mut history = vec![Message::system("S")];
        for i in 0..4 {
            history.push(Message::user(format!("u{i}")));
            history.push(Message::assistant(format!("a{i}")));
        }
        history.push(Message::user("last"));

        let backend = ScriptedBackend::new(vec![]);
        let engine = engine(backend.clone());
        assert!(run(&engine, history).await.is_err());
        assert_eq!(backend.requests().len(), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn missing_text_counts_as_failure() {
        let empty = || Ok(RawCompletion::new(200, json!({"choices": [{"message": {"content": null}}]})));
        let backend = ScriptedBackend::new(vec![empty(), empty(), empty()]);
        let engine = engine(backend.clone());

        let err = run(&engine, two_pairs_and_question()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Upstream { status_code: 200, .. }));
        assert_eq!(backend.requests().len(), 3);
    }

    #[tokio::test]
    async fn non_retryable_status_is_terminal() {
        let backend = ScriptedBackend::new(vec![status(401), ok("never")]);
        let engine = engine(backend.clone());

        let err = run(&engine, two_pairs_and_question()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Upstream { status_code: 401, .. }));
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn non_retryable_on_second_attempt_is_terminal() {
        let backend = ScriptedBackend::new(vec![status(413), status(404), ok("never")]);
        let engine = engine(backend.clone());

        let err = run(&engine, two_pairs_and_question()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Upstream { status_code: 404, .. }));
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn transport_failure_is_not_retried() {
        let backend = ScriptedBackend::new(vec![Err(ProviderError::Timeout("60s".into())), ok("never")]);
        let engine = engine(backend.clone());

        let err = run(&engine, two_pairs_and_question()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn minimal_fallback_clamps_the_user_message() {
        let backend = ScriptedBackend::new(vec![status(422), ok("short answer")]);
        let engine = engine(backend.clone()).with_limits(HistoryLimits {
            max_message_chars: 10,
            ..HistoryLimits::default()
        });

        let long = format!("{}{}", "x".repeat(20), "0123456789");
        run(&engine, vec![Message::system("S"), Message::user(long)])
            .await
            .unwrap();

        let requests = backend.requests();
        let expected = format!("{TRUNCATION_MARKER}0123456789");
        assert_eq!(requests[0].messages[1].content, expected);
        assert_eq!(requests[1].messages[1].content, expected);
    }

    #[tokio::test]
    async fn empty_prompt_is_sent_as_empty_system_in_fallback() {
        let backend = ScriptedBackend::new(vec![status(503), ok("ok")]);
        let engine = CompletionEngine::new(backend.clone(), "m", "");

        run(&engine, vec![Message::user("hi")]).await.unwrap();

        let requests = backend.requests();
        assert_eq!(contents(&requests[0].messages), ["hi"]);
        assert_eq!(requests[1].messages[0], Message::system(""));
    }

    #[tokio::test]
    async fn no_user_message_fails_without_fallback_call() {
        let backend = ScriptedBackend::new(vec![status(500)]);
        let engine = engine(backend.clone());

        let err = run(&engine, vec![Message::system("S")]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Upstream { status_code: 500, .. }));
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn precached_tokens_are_reported() {
        let backend = ScriptedBackend::new(vec![Ok(RawCompletion::new(
            200,
            json!({
                "choices": [{"message": {"content": "cached"}}],
                "usage": {"prompt_tokens": 100, "precached_prompt_tokens": 80}
            }),
        ))]);
        let engine = engine(backend);

        let done = run(&engine, vec![Message::user("hi")]).await.unwrap();
        assert_eq!(done.usage.precached_prompt_tokens, 80);
        assert_eq!(done.usage.completion_tokens, None);
    }
}
