//! Upstream clients for chatbridge.
//!
//! Each client implements one of the `chatbridge_core` boundaries:
//!
//! - [`GigaChatBackend`]: [`chatbridge_core::CompletionBackend`]
//! - [`OAuthTokenSource`]: [`chatbridge_core::TokenSource`]
//! - [`CachedFileUploader`]: [`chatbridge_core::FileUploader`]

pub mod gigachat;
pub mod http;
pub mod oauth;
pub mod upload;

pub use gigachat::GigaChatBackend;
pub use http::build_client;
pub use oauth::OAuthTokenSource;
pub use upload::CachedFileUploader;
