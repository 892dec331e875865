//! Opaque sync cursors.
//!
//! A cursor marks a device's last-synced position. Devices store and echo
//! it verbatim; only the server interprets it. The encoding is a UTC
//! millisecond timestamp (`cursor-{millis}`), and any cursor the server
//! cannot parse degrades to a full resync rather than an error, so a
//! device with a corrupted or ancient cache always converges.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Opaque position token issued by the server and echoed by devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor(String);

impl SyncCursor {
    /// Cursor marking `instant` as the synced-through position.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(format!("cursor-{}", instant.timestamp_millis()))
    }

    /// Wrap a stored token without interpreting it.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The instant this cursor encodes, if it parses.
    pub(crate) fn instant(&self) -> Option<DateTime<Utc>> {
        let millis = self.0.strip_prefix("cursor-")?.parse::<i64>().ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }
}

impl std::fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Start of the change window for a pull.
///
/// Absent or unreadable cursors widen the window to the epoch: a full
/// resync is always safe because applying changes is idempotent.
pub(crate) fn window_start(cursor: Option<&SyncCursor>) -> DateTime<Utc> {
    match cursor {
        Some(cursor) => match cursor.instant() {
            Some(instant) => instant,
            None => {
                debug!(cursor = cursor.as_str(), "Unreadable sync cursor, forcing full resync");
                DateTime::<Utc>::UNIX_EPOCH
            }
        },
        None => DateTime::<Utc>::UNIX_EPOCH,
    }
}
