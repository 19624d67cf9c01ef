//! The conversation engine for chatbridge.
//!
//! A turn flows through three layers:
//!
//! 1. [`context`] bounds the history (clamp, trim, pin the system prompt)
//! 2. [`engine`] sends it upstream, degrading on context errors
//! 3. [`service`] wires credentials, attachments and storage around the engine

pub mod context;
pub mod engine;
pub mod service;

pub use context::{HISTORY_TTL, HistoryLimits};
pub use engine::{Completion, CompletionEngine, MAX_ATTEMPTS, TurnContext};
pub use service::{ChatReply, ChatService};
