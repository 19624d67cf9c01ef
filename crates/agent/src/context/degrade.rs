//! Degradation policy: shrink a rejected request by one exchange.

use chatbridge_core::message::{History, Role};

/// Remove the oldest user message and the first assistant message after it.
///
/// Histories of two or fewer messages are returned unchanged. The assistant
/// scan starts where the user message was, so an assistant reply that
/// precedes every user message is never touched, and when no assistant
/// follows only the user message goes. System messages are never removed.
pub fn drop_oldest_pair(mut history: History) -> History {
    if history.len() <= 2 {
        return history;
    }

    let Some(user_at) = history.iter().position(|m| m.role == Role::User) else {
        return history;
    };
    history.remove(user_at);

    if let Some(offset) = history[user_at..]
        .iter()
        .position(|m| m.role == Role::Assistant)
    {
        history.remove(user_at + offset);
    }
    history
}
