//! Session history stores for chatbridge.
//!
//! All stores implement `chatbridge_core::HistoryStore`: a record lives for
//! the TTL given at save time and is dropped lazily when a load finds it
//! expired.

pub mod file_backend;
pub mod in_memory;
pub mod layered;

pub use file_backend::FileHistoryStore;
pub use in_memory::InMemoryHistoryStore;
pub use layered::LayeredHistoryStore;

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Expiry timestamp `ttl` after `now`, saturating on absurd TTLs.
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
