//! Hard clamp and soft trim.
//!
//! Both passes count characters, not bytes, so multi-byte text is budgeted
//! the same way the caller perceives it.

use chatbridge_core::message::{History, Message, Role};

use super::limits::{HistoryLimits, TRUNCATION_MARKER};

/// Clamp one string to `max_chars`, keeping the tail.
///
/// Oversized content becomes [`TRUNCATION_MARKER`] followed by the last
/// `max_chars` characters. Content within the limit is returned unchanged.
pub fn clamp_content(content: &str, max_chars: usize) -> String {
    let len = content.chars().count();
    if len <= max_chars {
        return content.to_string();
    }

    let tail_start = content
        .char_indices()
        .nth(len - max_chars)
        .map_or(content.len(), |(i, _)| i);

    let mut clamped = String::with_capacity(TRUNCATION_MARKER.len() + content.len() - tail_start);
    clamped.push_str(TRUNCATION_MARKER);
    clamped.push_str(&content[tail_start..]);
    clamped
}

/// Apply [`clamp_content`] to every message.
pub fn hard_clamp(history: History, limits: &HistoryLimits) -> History {
    history
        .into_iter()
        .map(|mut m| {
            if m.char_len() > limits.max_message_chars {
                m.content = clamp_content(&m.content, limits.max_message_chars);
            }
            m
        })
        .collect()
}

/// Bound the history by message count and character budget.
///
/// A leading system message is detached first: it counts as one of
/// `max_messages` but not against `max_prefix_chars`, and it is always put
/// back in front. The remainder keeps its newest messages, then is walked
/// newest to oldest and cut at the first message that would overflow the
/// character budget.
pub fn soft_trim(mut history: History, limits: &HistoryLimits) -> History {
    let system = match history.first() {
        Some(first) if first.role == Role::System => Some(history.remove(0)),
        _ => None,
    };

    let limit_tail = if system.is_some() {
        limits.max_messages.saturating_sub(1)
    } else {
        limits.max_messages
    };
    if history.len() > limit_tail {
        history.drain(..history.len() - limit_tail);
    }

    let mut total = 0usize;
    let mut kept: Vec<Message> = Vec::with_capacity(history.len() + 1);
    for msg in history.into_iter().rev() {
        let len = msg.char_len();
        if total + len > limits.max_prefix_chars {
            break;
        }
        total += len;
        kept.push(msg);
    }

    if let Some(system) = system {
        kept.push(system);
    }
    kept.reverse();
    kept
}
