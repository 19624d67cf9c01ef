//! Conversation-history shaping.
//!
//! Pure functions (no I/O) that bound what is sent upstream and what is
//! stored, applied in a fixed order:
//!
//! | Pass | Function | Bound |
//! |------|----------|-------|
//! | Hard clamp | [`hard_clamp`] | each message ≤ `max_message_chars` (tail kept) |
//! | Soft trim | [`soft_trim`] | message count and non-system character budget |
//! | Enforcer | [`force_system_prompt`] | exactly one system message, first |
//! | Degradation | [`drop_oldest_pair`] | removes the oldest user/assistant exchange |

pub mod degrade;
pub mod limits;
pub mod system_prompt;
pub mod trim;

pub use degrade::drop_oldest_pair;
pub use limits::{HISTORY_TTL, HistoryLimits, MAX_MSGS, MAX_ONE_MSG, MAX_PREFIX, TRUNCATION_MARKER};
pub use system_prompt::force_system_prompt;
pub use trim::{clamp_content, hard_clamp, soft_trim};
