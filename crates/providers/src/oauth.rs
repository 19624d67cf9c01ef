//! Client-credentials token source with an in-process cache.
//!
//! A token is reused until 30 seconds before the expiry the endpoint
//! announced, then fetched again. Concurrent callers share one refresh.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chatbridge_config::AppConfig;
use chatbridge_core::auth::{AccessToken, TokenSource};
use chatbridge_core::error::{AuthError, Result};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::http::{build_client, endpoint, json_or_empty};

const OAUTH_PATH: &str = "/api/v2/oauth";

/// Seconds shaved off the announced lifetime.
const EXPIRY_MARGIN_SECS: i64 = 30;

pub struct OAuthTokenSource {
    oauth_base: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    scope: String,
    client: reqwest::Client,
    cached: Mutex<Option<AccessToken>>,
}

impl OAuthTokenSource {
    pub fn new(
        oauth_base: impl Into<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
        scope: impl Into<String>,
        ca_bundle: Option<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            oauth_base: oauth_base.into(),
            client_id,
            client_secret,
            scope: scope.into(),
            client: build_client(ca_bundle.as_deref(), timeout)?,
            cached: Mutex::new(None),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.oauth_base.clone(),
            config.auth.client_id.clone(),
            config.auth.client_secret.clone(),
            config.auth.scope.clone(),
            config.ca_bundle.clone(),
            Duration::from_secs(config.timeouts.token_secs),
        )
    }

    fn credentials(&self) -> std::result::Result<(&str, &str), AuthError> {
        let id = self.client_id.as_deref().map(str::trim).unwrap_or_default();
        let secret = self
            .client_secret
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();
        if id.is_empty() || secret.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        Ok((id, secret))
    }

    async fn fetch(&self, now: DateTime<Utc>) -> std::result::Result<AccessToken, AuthError> {
        let (id, secret) = self.credentials()?;

        let response = self
            .client
            .post(endpoint(&self.oauth_base, OAUTH_PATH))
            .basic_auth(id, Some(secret))
            .header("Accept", "application/json")
            .header("RqUID", uuid::Uuid::new_v4().to_string())
            .form(&[("scope", self.scope.as_str())])
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let body = json_or_empty(&bytes);

        let token = body["access_token"].as_str().unwrap_or_default();
        if !(200..300).contains(&status) || token.is_empty() {
            warn!(status, "Token endpoint rejected the request");
            return Err(AuthError::Rejected {
                status_code: status,
                body,
            });
        }

        Ok(AccessToken {
            token: token.to_string(),
            expires_at: expiry_from(&body, now),
        })
    }
}

/// `expires_in` (seconds from now) wins; `expires_at` (epoch millis) is the
/// fallback. Either way the margin is subtracted, never going below `now`.
fn expiry_from(body: &serde_json::Value, now: DateTime<Utc>) -> DateTime<Utc> {
    let announced = body["expires_in"]
        .as_i64()
        .map(|secs| now + chrono::Duration::seconds(secs))
        .or_else(|| {
            body["expires_at"]
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        })
        .unwrap_or(now);

    let with_margin = announced - chrono::Duration::seconds(EXPIRY_MARGIN_SECS);
    with_margin.max(now)
}

#[async_trait]
impl TokenSource for OAuthTokenSource {
    async fn access_token(&self) -> std::result::Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref().filter(|t| t.is_valid_at(now)) {
            debug!("Reusing cached access token");
            return Ok(token.token.clone());
        }

        let fresh = self.fetch(now).await?;
        info!(expires_at = %fresh.expires_at, "Obtained new access token");
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer, id: Option<&str>, secret: Option<&str>) -> OAuthTokenSource {
        OAuthTokenSource::new(
            format!("{}/", server.uri()),
            id.map(String::from),
            secret.map(String::from),
            "GIGACHAT_API_B2B",
            None,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_once_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/oauth"))
            .and(header("Authorization", "Basic aWQ6c2VjcmV0"))
            .and(header_exists("RqUID"))
            .and(body_string("scope=GIGACHAT_API_B2B"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "tok-1", "expires_in": 1800})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tokens = source(&server, Some("id"), Some("secret"));
        assert_eq!(tokens.access_token().await.unwrap(), "tok-1");
        assert_eq!(tokens.access_token().await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn short_lived_token_is_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "tok", "expires_in": 10})),
            )
            .expect(2)
            .mount(&server)
            .await;

        // 10s lifetime minus the 30s margin: expired on arrival.
        let tokens = source(&server, Some("id"), Some("secret"));
        tokens.access_token().await.unwrap();
        tokens.access_token().await.unwrap();
    }

    #[tokio::test]
    async fn missing_credentials_never_call_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = source(&server, Some("id"), Some("  "))
            .access_token()
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials));
    }

    #[tokio::test]
    async fn rejection_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "bad"})))
            .mount(&server)
            .await;

        match source(&server, Some("id"), Some("secret")).access_token().await {
            Err(AuthError::Rejected { status_code, body }) => {
                assert_eq!(status_code, 401);
                assert_eq!(body["message"], "bad");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_without_token_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"expires_in": 60})))
            .mount(&server)
            .await;

        let err = source(&server, Some("id"), Some("secret"))
            .access_token()
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Rejected { status_code: 200, .. }));
    }

    #[test]
    fn expiry_prefers_expires_in() {
        let now = Utc::now();
        let exp = expiry_from(&json!({"expires_in": 1800, "expires_at": 0}), now);
        assert_eq!(exp, now + chrono::Duration::seconds(1770));
    }

    #[test]
    fn expiry_falls_back_to_epoch_millis() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let exp = expiry_from(&json!({"expires_at": 1_700_000_600_000_i64}), now);
        assert_eq!(exp, Utc.timestamp_opt(1_700_000_570, 0).unwrap());
    }

    #[test]
    fn expiry_never_precedes_now() {
        let now = Utc::now();
        assert_eq!(expiry_from(&json!({}), now), now);
    }
}
