//! # chatbridge Core
//!
//! Domain types, boundary traits, and error definitions for the chatbridge
//! completion adapter. This crate has **no HTTP or storage dependencies**;
//! it defines the model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (completion endpoint, history cache, token
//! endpoint, file upload) is a trait here. Implementations live in their
//! respective crates, so the history/retry engine can be tested with
//! scripted stand-ins.

pub mod auth;
pub mod error;
pub mod memory;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use auth::{AccessToken, FileUploader, TokenSource};
pub use error::{Error, Result};
pub use memory::HistoryStore;
pub use message::{History, Message, Role, SessionId, SessionRecord};
pub use provider::{CompletionBackend, CompletionRequest, RawCompletion, Usage};
