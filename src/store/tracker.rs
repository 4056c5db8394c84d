//! Self-write detection for the monthly state files.
//!
//! The host's change-notification source reports every file event, including
//! the ones this engine just produced. There is no write-acknowledgement
//! channel to correlate against, so the store remembers a content hash of
//! each write it performs; an incoming event whose content matches a
//! remembered hash is an echo and must not trigger reconciliation.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use crc32c::crc32c;

use crate::core::time::WallClock;

/// Remembered hashes per path. Writes to the same file in quick succession
/// can each produce an echo, so a short queue is kept rather than one slot.
const MAX_HASHES_PER_PATH: usize = 8;

/// Echoes arrive within the host's debounce window; anything older than this
/// is a stale record, not a pending echo.
const HASH_TTL_MS: u64 = 5_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HashRecord {
    hash: u32,
    recorded_at: WallClock,
}

/// Content-hash ledger distinguishing self-originated file events from real
/// external changes.
#[derive(Debug, Default)]
pub struct LocalWriteTracker {
    records: BTreeMap<PathBuf, VecDeque<HashRecord>>,
}

impl LocalWriteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the exact bytes about to be written to `path`.
    pub fn record(&mut self, path: &Path, bytes: &[u8], now: WallClock) {
        self.prune(now);
        let queue = self.records.entry(path.to_path_buf()).or_default();
        queue.push_back(HashRecord {
            hash: crc32c(bytes),
            recorded_at: now,
        });
        while queue.len() > MAX_HASHES_PER_PATH {
            queue.pop_front();
        }
    }

    /// Discard the most recent record matching `bytes`, after a failed write.
    ///
    /// Without this, the tracker would later swallow a legitimate external
    /// notification whose content this process never durably wrote.
    pub fn forget(&mut self, path: &Path, bytes: &[u8]) {
        let hash = crc32c(bytes);
        if let Some(queue) = self.records.get_mut(path) {
            if let Some(pos) = queue.iter().rposition(|record| record.hash == hash) {
                let _ = queue.remove(pos);
            }
            if queue.is_empty() {
                self.records.remove(path);
            }
        }
    }

    /// Decide whether a reported change to `path` is an echo of our own
    /// write.
    ///
    /// Without content this always answers "external": an unverified event is
    /// never silently suppressed. With content, a matching record (optionally
    /// restricted to records no later than `max_recorded_at`) is consumed and
    /// the event is an echo.
    pub fn consume(
        &mut self,
        path: &Path,
        content: Option<&[u8]>,
        max_recorded_at: Option<WallClock>,
        now: WallClock,
    ) -> bool {
        self.prune(now);
        let Some(content) = content else {
            return false;
        };
        let hash = crc32c(content);
        let Some(queue) = self.records.get_mut(path) else {
            return false;
        };
        let matched = queue.iter().position(|record| {
            record.hash == hash && max_recorded_at.is_none_or(|max| record.recorded_at <= max)
        });
        let Some(pos) = matched else {
            return false;
        };
        let _ = queue.remove(pos);
        if queue.is_empty() {
            self.records.remove(path);
        }
        true
    }

    fn prune(&mut self, now: WallClock) {
        self.records.retain(|_, queue| {
            queue.retain(|record| record.recorded_at.as_millis() + HASH_TTL_MS >= now.as_millis());
            !queue.is_empty()
        });
    }
}
