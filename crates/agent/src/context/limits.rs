//! History bounds.

use std::time::Duration;

/// How long a session's history lives after its last save.
pub const HISTORY_TTL: Duration = Duration::from_secs(3600);

/// Maximum messages kept, the system message included.
pub const MAX_MSGS: usize = 10;

/// Maximum total characters across non-system messages.
pub const MAX_PREFIX: usize = 24_000;

/// Maximum characters in any single message.
pub const MAX_ONE_MSG: usize = 4_000;

/// Prepended to a message whose head was cut off.
pub const TRUNCATION_MARKER: &str = "…[truncated]…";

/// The bounds applied by the trimmer. `Default` uses the constants above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub max_messages: usize,
    pub max_prefix_chars: usize,
    pub max_message_chars: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_messages: MAX_MSGS,
            max_prefix_chars: MAX_PREFIX,
            max_message_chars: MAX_ONE_MSG,
        }
    }
}
