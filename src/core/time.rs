//! Wall-clock stamps for last-writer-wins resolution.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Epoch-millisecond wall clock.
///
/// Ordering across unsynchronized writers is best effort; merge rules only
/// require that stamps from the same logical edit stream are monotonic.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct WallClock(pub u64);

impl WallClock {
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(ms)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }
}

/// RFC 3339 rendering of the current instant, for `metadata.lastUpdated`.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
