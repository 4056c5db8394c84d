//! The day-state store: monthly cache, read-modify-write day operations, and
//! reconciliation of externally-changed monthly files.
//!
//! Writes are optimistic: they always succeed locally and unconditionally,
//! and divergence between unsynchronized writers is repaired on the next
//! read-side reconciliation rather than prevented. The cache gives a single
//! process read-after-write consistency; callers serialize logically related
//! mutations themselves.

pub mod fs;
pub mod tracker;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::core::day::{DayState, MonthlyState, STATE_VERSION};
use crate::core::keys::{DateKey, MonthKey};
use crate::core::merge::{
    NoMetaPolicy, merge_day, merge_deleted_instances, merge_duplicated_instances,
    merge_hidden_routines,
};
use crate::core::sections::{ORDER_KEY_SEPARATOR, SectionProvider, SectionValidator};
use crate::core::time::{WallClock, now_rfc3339};
use crate::error::Result;
use crate::paths::{month_key_for_path, state_file_path};

pub use fs::{DiskFs, StateFs};
pub use tracker::LocalWriteTracker;

/// Result of reconciling one externally-changed month.
#[derive(Clone, Debug)]
pub struct MergedMonth {
    pub month: MonthlyState,
    /// Dates whose merged state differs from the pre-merge cache, or whose
    /// merge had to resolve a conflict. The UI refreshes exactly these.
    pub affected: Vec<DateKey>,
}

pub struct DayStateStore<F: StateFs> {
    fs: F,
    sections: Arc<dyn SectionProvider>,
    config: Config,
    cache: BTreeMap<MonthKey, MonthlyState>,
    tracker: LocalWriteTracker,
}

impl<F: StateFs> DayStateStore<F> {
    pub fn new(fs: F, sections: Arc<dyn SectionProvider>, config: Config) -> Self {
        Self {
            fs,
            sections,
            config,
            cache: BTreeMap::new(),
            tracker: LocalWriteTracker::new(),
        }
    }

    /// Path of the monthly state file for `month`.
    pub fn month_path(&self, month: &MonthKey) -> PathBuf {
        state_file_path(&self.config.log_base, month)
    }

    /// Cloned state for `date`, synthesizing an empty day if absent.
    ///
    /// Reads never create files.
    pub fn load_day(&mut self, date: &DateKey) -> Result<DayState> {
        let month_key = date.month_key();
        self.ensure_month(&month_key)?;
        Ok(self
            .cache
            .get(&month_key)
            .and_then(|month| month.days.get(date))
            .cloned()
            .unwrap_or_default())
    }

    /// Persist `state` for `date`, writing the whole month in one write.
    ///
    /// Saving a structurally identical state is a no-op without I/O.
    pub fn save_day(&mut self, date: &DateKey, state: DayState) -> Result<()> {
        let month_key = date.month_key();
        self.ensure_month(&month_key)?;

        let current = self
            .cache
            .get(&month_key)
            .and_then(|month| month.days.get(date))
            .cloned()
            .unwrap_or_default();
        if current == state {
            return Ok(());
        }

        let mut month = self.cache.get(&month_key).cloned().unwrap_or_default();
        month.days.insert(*date, state);
        self.persist_month(month_key, month)
    }

    /// Clone the current day, apply `mutator`, persist only if it changed.
    ///
    /// Returns the (possibly unchanged) final state.
    pub fn update_day(
        &mut self,
        date: &DateKey,
        mutator: impl FnOnce(&mut DayState),
    ) -> Result<DayState> {
        let before = self.load_day(date)?;
        let mut after = before.clone();
        mutator(&mut after);

        if after != before {
            let month_key = date.month_key();
            let mut month = self.cache.get(&month_key).cloned().unwrap_or_default();
            month.days.insert(*date, after.clone());
            self.persist_month(month_key, month)?;
        }
        Ok(after)
    }

    /// Fold `partial` into the current day: identity-keyed unions for the
    /// collection fields, shallow overwrite for the scalar maps.
    ///
    /// Same-process accumulation, not cross-device reconciliation.
    pub fn merge_day_state(&mut self, date: &DateKey, partial: &DayState) -> Result<DayState> {
        let current = self.load_day(date)?;
        let merged = apply_partial(&current, partial);

        if merged != current {
            let month_key = date.month_key();
            let mut month = self.cache.get(&month_key).cloned().unwrap_or_default();
            month.days.insert(*date, merged.clone());
            self.persist_month(month_key, month)?;
        }
        Ok(merged)
    }

    /// Rewrite `old_path` to `new_path` across every stored month and across
    /// the in-memory cache, preserving all other metadata untouched.
    ///
    /// Files are processed independently: a read/parse/write failure on one
    /// is logged and skipped. Returns the months whose files were rewritten.
    pub fn rename_task_path(&mut self, old_path: &str, new_path: &str) -> Result<Vec<MonthKey>> {
        // Cached copies first, so open views reflect the rename immediately.
        for month in self.cache.values_mut() {
            for day in month.days.values_mut() {
                rewrite_day_paths(day, old_path, new_path);
            }
        }

        let files = match self.fs.list(&self.config.log_base)? {
            Some(entries) => entries,
            None => MonthKey::recent_window(self.config.rename_window_months)
                .into_iter()
                .map(|month| state_file_path(&self.config.log_base, &month))
                .filter(|path| self.fs.exists(path))
                .collect(),
        };

        let mut touched = Vec::new();
        for path in files {
            let Some(month_key) = month_key_for_path(&path) else {
                continue;
            };
            let bytes = match self.fs.read(&path) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!("rename: failed to read {}: {err}", path.display());
                    continue;
                }
            };
            let mut month: MonthlyState = match serde_json::from_slice(&bytes) {
                Ok(month) => month,
                Err(err) => {
                    tracing::warn!("rename: skipping malformed {}: {err}", path.display());
                    continue;
                }
            };

            let mut changed = false;
            for day in month.days.values_mut() {
                changed |= rewrite_day_paths(day, old_path, new_path);
            }
            if !changed {
                continue;
            }

            let encoded = match Self::encode_month(&mut month) {
                Ok(encoded) => encoded,
                Err(err) => {
                    tracing::warn!("rename: failed to encode {}: {err}", path.display());
                    continue;
                }
            };
            if let Err(err) = self.write_tracked(&path, &encoded) {
                tracing::warn!("rename: failed to write {}: {err}", path.display());
                continue;
            }
            touched.push(month_key);
        }

        if !touched.is_empty() {
            tracing::info!(
                files = touched.len(),
                "rewrote task path references: {old_path} -> {new_path}"
            );
        }
        Ok(touched)
    }

    /// Reconcile a detected external change to `month`'s file.
    ///
    /// With no cached version there is nothing to merge: the disk version
    /// becomes the cache verbatim. Otherwise every date appearing on either
    /// side is merged field by field, and the merged month is written back
    /// only if some date was affected.
    pub fn merge_external_change(&mut self, month_key: &MonthKey) -> Result<MergedMonth> {
        let disk = self.read_month_from_disk(month_key)?;
        let Some(cached) = self.cache.get(month_key).cloned() else {
            self.cache.insert(*month_key, disk.clone());
            tracing::debug!("adopted external {month_key} verbatim (month not cached)");
            return Ok(MergedMonth {
                month: disk,
                affected: Vec::new(),
            });
        };

        let validator = SectionValidator::from_provider(self.sections.as_ref());
        let mut dates: BTreeSet<DateKey> = cached.days.keys().copied().collect();
        dates.extend(disk.days.keys().copied());

        let mut merged = MonthlyState {
            days: BTreeMap::new(),
            metadata: disk.metadata.clone(),
        };
        let mut affected = Vec::new();
        for date in dates {
            let before = cached.days.get(&date).cloned().unwrap_or_default();
            let mut local = before.clone();
            let mut remote = disk.days.get(&date).cloned().unwrap_or_default();
            validator.sanitize_day(&mut local);
            validator.sanitize_day(&mut remote);

            let outcome = merge_day(&local, &remote, NoMetaPolicy::Remote);
            if outcome.has_conflicts || outcome.merged != before {
                affected.push(date);
            }
            merged.days.insert(date, outcome.merged);
        }

        if affected.is_empty() {
            self.cache.insert(*month_key, merged);
        } else {
            tracing::info!(
                affected = affected.len(),
                "reconciled external change to {month_key}"
            );
            self.persist_month(*month_key, merged)?;
        }

        let month = self.cache.get(month_key).cloned().unwrap_or_default();
        Ok(MergedMonth { month, affected })
    }

    /// Flush a batch of buffered local edits against the freshest disk state.
    ///
    /// The cached month is dropped and reloaded from disk first; order/slot
    /// keys on both sides are sanitized; buffered days merge with the policy
    /// "disk wins when neither side has metadata, except local-only keys".
    /// One write covers the whole month regardless of how many dates were
    /// buffered.
    pub fn merge_and_save_month(
        &mut self,
        month_key: &MonthKey,
        local_days: &BTreeMap<DateKey, DayState>,
    ) -> Result<MonthlyState> {
        self.cache.remove(month_key);
        let mut month = self.read_month_from_disk(month_key)?;

        let validator = SectionValidator::from_provider(self.sections.as_ref());
        for day in month.days.values_mut() {
            validator.sanitize_day(day);
        }
        for (date, buffered) in local_days {
            let mut local = buffered.clone();
            validator.sanitize_day(&mut local);
            let disk_day = month.days.get(date).cloned().unwrap_or_default();

            let outcome = merge_day(&local, &disk_day, NoMetaPolicy::RemoteExceptLocalOnly);
            month.days.insert(*date, outcome.merged);
        }

        self.persist_month(*month_key, month)?;
        Ok(self.cache.get(month_key).cloned().unwrap_or_default())
    }

    /// Decide whether a reported file change is an echo of our own write.
    ///
    /// True means "ignore this event". See [`LocalWriteTracker::consume`].
    pub fn consume_local_state_write(
        &mut self,
        path: &Path,
        content: Option<&[u8]>,
        max_recorded_at: Option<WallClock>,
    ) -> bool {
        let echo = self
            .tracker
            .consume(path, content, max_recorded_at, WallClock::now());
        if echo {
            tracing::debug!("suppressed self-write echo at {}", path.display());
        }
        echo
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Invalidate the cached month containing `date`.
    pub fn clear_cache_for_date(&mut self, date: &DateKey) {
        self.cache.remove(&date.month_key());
    }

    fn ensure_month(&mut self, month_key: &MonthKey) -> Result<()> {
        if !self.cache.contains_key(month_key) {
            let loaded = self.read_month_from_disk(month_key)?;
            self.cache.insert(*month_key, loaded);
        }
        Ok(())
    }

    fn read_month_from_disk(&self, month_key: &MonthKey) -> Result<MonthlyState> {
        let path = self.month_path(month_key);
        let Some(bytes) = self.fs.read(&path)? else {
            return Ok(MonthlyState::default());
        };
        match serde_json::from_slice(&bytes) {
            Ok(month) => Ok(month),
            Err(err) => {
                tracing::warn!(
                    "malformed monthly state at {}: {err}; treating as empty",
                    path.display()
                );
                Ok(MonthlyState::default())
            }
        }
    }

    fn encode_month(month: &mut MonthlyState) -> Result<Vec<u8>> {
        month.metadata.version = STATE_VERSION.to_string();
        month.metadata.last_updated = now_rfc3339();
        Ok(serde_json::to_vec_pretty(month)?)
    }

    fn write_tracked(&mut self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.tracker.record(path, bytes, WallClock::now());
        if let Err(err) = self.fs.write(path, bytes) {
            self.tracker.forget(path, bytes);
            return Err(err);
        }
        Ok(())
    }

    /// Swap `month` into the cache and write it out; on a write failure the
    /// cache rolls back to its previous value so a later plain save can still
    /// persist the data through a different call path.
    fn persist_month(&mut self, month_key: MonthKey, mut month: MonthlyState) -> Result<()> {
        let bytes = Self::encode_month(&mut month)?;
        let path = self.month_path(&month_key);
        let prev = self.cache.insert(month_key, month);

        if let Err(err) = self.write_tracked(&path, &bytes) {
            match prev {
                Some(prev) => {
                    self.cache.insert(month_key, prev);
                }
                None => {
                    self.cache.remove(&month_key);
                }
            }
            return Err(err);
        }
        Ok(())
    }
}

/// Identity-keyed unions for the collections, shallow overwrite for the maps.
fn apply_partial(current: &DayState, partial: &DayState) -> DayState {
    let deleted =
        merge_deleted_instances(&current.deleted_instances, &partial.deleted_instances).merged;
    let duplicated = merge_duplicated_instances(
        &current.duplicated_instances,
        &partial.duplicated_instances,
        &deleted,
    )
    .merged;
    let hidden = merge_hidden_routines(&current.hidden_routines, &partial.hidden_routines).merged;

    let mut merged = DayState {
        hidden_routines: hidden,
        deleted_instances: deleted,
        duplicated_instances: duplicated,
        slot_overrides: current.slot_overrides.clone(),
        slot_meta: current.slot_meta.clone(),
        orders: current.orders.clone(),
        order_meta: current.order_meta.clone(),
    };
    merged.slot_overrides.extend(
        partial
            .slot_overrides
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    merged
        .slot_meta
        .extend(partial.slot_meta.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
        .orders
        .extend(partial.orders.iter().map(|(k, v)| (k.clone(), *v)));
    merged
        .order_meta
        .extend(partial.order_meta.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

fn rewrite_key(key: &str, old: &str, new: &str) -> Option<String> {
    if key == old {
        return Some(new.to_string());
    }
    let rest = key.strip_prefix(old)?;
    rest.starts_with(ORDER_KEY_SEPARATOR)
        .then(|| format!("{new}{rest}"))
}

fn rewrite_map_keys<T>(map: &mut BTreeMap<String, T>, old: &str, new: &str) -> bool {
    let moves: Vec<String> = map
        .keys()
        .filter(|key| rewrite_key(key, old, new).is_some())
        .cloned()
        .collect();

    let mut changed = false;
    for key in moves {
        if let Some(value) = map.remove(&key)
            && let Some(renamed) = rewrite_key(&key, old, new)
        {
            map.insert(renamed, value);
            changed = true;
        }
    }
    changed
}

/// Rewrite every reference to `old` across the five fields of one day.
fn rewrite_day_paths(day: &mut DayState, old: &str, new: &str) -> bool {
    let mut changed = false;
    for record in &mut day.hidden_routines {
        if record.path == old {
            record.path = new.to_string();
            changed = true;
        }
    }
    for record in &mut day.deleted_instances {
        if record.path.as_deref() == Some(old) {
            record.path = Some(new.to_string());
            changed = true;
        }
    }
    for record in &mut day.duplicated_instances {
        if record.original_path == old {
            record.original_path = new.to_string();
            changed = true;
        }
    }
    changed |= rewrite_map_keys(&mut day.slot_overrides, old, new);
    changed |= rewrite_map_keys(&mut day.slot_meta, old, new);
    changed |= rewrite_map_keys(&mut day.orders, old, new);
    changed |= rewrite_map_keys(&mut day.order_meta, old, new);
    changed
}
