//! System-prompt enforcement.

use chatbridge_core::message::{History, Message, Role};

/// Pin `prompt` as the only system message, at index 0.
///
/// Every existing system message is removed first, wherever it sits, so
/// duplicated or stale instructions never survive. Idempotent.
pub fn force_system_prompt(history: History, prompt: &str) -> History {
    let mut pinned = Vec::with_capacity(history.len() + 1);
    pinned.push(Message::system(prompt));
    pinned.extend(history.into_iter().filter(|m| m.role != Role::System));
    pinned
}
