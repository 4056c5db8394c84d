//! Field-aware merge of two versions of a day's state.
//!
//! Pure functions over plain records: no I/O, no store coupling. Collection
//! fields merge as OR-Sets keyed by their identity; scalar maps merge per key
//! by last writer. Each merger reports whether it had to resolve a real
//! disagreement so the store can tell callers which dates need a refresh.
//!
//! Merge laws: every merger is commutative up to the documented local/remote
//! tie-breaks, idempotent, and never drops a tombstone.

use std::collections::{BTreeMap, BTreeSet};

use super::day::{DayState, DeletedInstance, DeletionType, DuplicatedInstance, HiddenRoutine, KeyMeta};

/// Result of merging one field (or a whole day).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutcome<T> {
    pub merged: T,
    pub has_conflicts: bool,
}

/// What to do with an order/slot key carrying no metadata on either side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoMetaPolicy {
    /// The remote side is authoritative, including its absences: a shared key
    /// takes the remote value and a local-only key is dropped. Used by
    /// reconciliation so an unlabeled external update is never clobbered.
    Remote,
    /// A shared key takes the remote (disk) value, but keys present only in
    /// the local map survive. Used by the batch flush so buffered edits are
    /// not lost to a concurrent external writer.
    RemoteExceptLocalOnly,
}

/// OR-Set union of hidden-routine records keyed by `(path, instanceId)`.
///
/// When both sides hold the same identity, the record with the newer stamp
/// wins; on a stamp tie the hidden record wins, matching the pre-stamp
/// behavior where presence alone meant hidden.
pub fn merge_hidden_routines(
    local: &[HiddenRoutine],
    remote: &[HiddenRoutine],
) -> MergeOutcome<Vec<HiddenRoutine>> {
    let mut merged: BTreeMap<(String, Option<String>), HiddenRoutine> = BTreeMap::new();
    let mut has_conflicts = false;

    for record in local {
        let key = (record.path.clone(), record.instance_id.clone());
        merged.insert(key, record.clone());
    }
    for record in remote {
        let key = (record.path.clone(), record.instance_id.clone());
        match merged.get_mut(&key) {
            None => {
                merged.insert(key, record.clone());
            }
            Some(existing) => {
                if existing.is_hidden() != record.is_hidden() {
                    has_conflicts = true;
                }
                let keep_remote = match record.stamp().cmp(&existing.stamp()) {
                    std::cmp::Ordering::Greater => true,
                    std::cmp::Ordering::Less => false,
                    std::cmp::Ordering::Equal => record.is_hidden() && !existing.is_hidden(),
                };
                if keep_remote {
                    *existing = record.clone();
                }
            }
        }
    }

    MergeOutcome {
        merged: merged.into_values().collect(),
        has_conflicts,
    }
}

/// Union of deletion tombstones keyed by `(deletionType, path, instanceId)`.
///
/// Additive only: a merge never removes a tombstone, it can only supersede
/// one with a newer stamp for the same identity.
pub fn merge_deleted_instances(
    local: &[DeletedInstance],
    remote: &[DeletedInstance],
) -> MergeOutcome<Vec<DeletedInstance>> {
    type Key = (DeletionType, Option<String>, Option<String>);
    let mut merged: BTreeMap<Key, DeletedInstance> = BTreeMap::new();
    let mut has_conflicts = false;

    for record in local {
        let key = (
            record.deletion_type,
            record.path.clone(),
            record.instance_id.clone(),
        );
        merged.insert(key, record.clone());
    }
    for record in remote {
        let key = (
            record.deletion_type,
            record.path.clone(),
            record.instance_id.clone(),
        );
        match merged.get_mut(&key) {
            None => {
                merged.insert(key, record.clone());
            }
            Some(existing) => {
                if existing != record {
                    has_conflicts = true;
                }
                if record.stamp() > existing.stamp() {
                    *existing = record.clone();
                }
            }
        }
    }

    MergeOutcome {
        merged: merged.into_values().collect(),
        has_conflicts,
    }
}

/// OR-Set union of duplication records keyed by `instanceId`, with tombstone
/// suppression.
///
/// `tombstones` must be the *already-merged* deletion list so a deletion seen
/// on either side suppresses a duplicate introduced on either side.
pub fn merge_duplicated_instances(
    local: &[DuplicatedInstance],
    remote: &[DuplicatedInstance],
    tombstones: &[DeletedInstance],
) -> MergeOutcome<Vec<DuplicatedInstance>> {
    let mut merged: BTreeMap<String, DuplicatedInstance> = BTreeMap::new();
    let mut has_conflicts = false;

    for record in local {
        merged.insert(record.instance_id.clone(), record.clone());
    }
    for record in remote {
        match merged.get_mut(&record.instance_id) {
            None => {
                merged.insert(record.instance_id.clone(), record.clone());
            }
            Some(existing) => {
                if existing != record {
                    has_conflicts = true;
                    if record.created_millis > existing.created_millis {
                        *existing = record.clone();
                    }
                }
            }
        }
    }

    let merged = merged
        .into_values()
        .filter(|dup| !tombstones.iter().any(|t| t.suppresses(dup)))
        .collect();

    MergeOutcome {
        merged,
        has_conflicts,
    }
}

/// Per-key LWW merge of `slotOverrides` and its metadata.
pub fn merge_slot_overrides(
    local: &BTreeMap<String, String>,
    local_meta: &BTreeMap<String, KeyMeta<String>>,
    remote: &BTreeMap<String, String>,
    remote_meta: &BTreeMap<String, KeyMeta<String>>,
    policy: NoMetaPolicy,
) -> MergeOutcome<(BTreeMap<String, String>, BTreeMap<String, KeyMeta<String>>)> {
    merge_keyed(local, local_meta, remote, remote_meta, policy)
}

/// Per-key LWW merge of `orders` and its metadata.
pub fn merge_orders(
    local: &BTreeMap<String, i64>,
    local_meta: &BTreeMap<String, KeyMeta<i64>>,
    remote: &BTreeMap<String, i64>,
    remote_meta: &BTreeMap<String, KeyMeta<i64>>,
    policy: NoMetaPolicy,
) -> MergeOutcome<(BTreeMap<String, i64>, BTreeMap<String, KeyMeta<i64>>)> {
    merge_keyed(local, local_meta, remote, remote_meta, policy)
}

/// Shared scalar-map merge.
///
/// A side carrying the only metadata for a key wins outright regardless of
/// raw values; with metadata on both sides the newer stamp wins (remote wins
/// stamp ties); with metadata on neither side the policy decides.
fn merge_keyed<T: Clone + PartialEq>(
    local: &BTreeMap<String, T>,
    local_meta: &BTreeMap<String, KeyMeta<T>>,
    remote: &BTreeMap<String, T>,
    remote_meta: &BTreeMap<String, KeyMeta<T>>,
    policy: NoMetaPolicy,
) -> MergeOutcome<(BTreeMap<String, T>, BTreeMap<String, KeyMeta<T>>)> {
    let mut keys: BTreeSet<&String> = BTreeSet::new();
    keys.extend(local.keys());
    keys.extend(local_meta.keys());
    keys.extend(remote.keys());
    keys.extend(remote_meta.keys());

    let mut values = BTreeMap::new();
    let mut meta = BTreeMap::new();
    let mut has_conflicts = false;

    for key in keys {
        let sides_disagree = match (local.get(key), remote.get(key)) {
            (Some(l), Some(r)) => l != r,
            _ => false,
        };

        match (local_meta.get(key), remote_meta.get(key)) {
            (Some(l), Some(r)) => {
                if l.value != r.value {
                    has_conflicts = true;
                }
                let winner = if r.updated_at >= l.updated_at { r } else { l };
                values.insert(key.clone(), winner.value.clone());
                meta.insert(key.clone(), winner.clone());
            }
            (Some(l), None) => {
                if sides_disagree || remote.get(key).is_some_and(|v| *v != l.value) {
                    has_conflicts = true;
                }
                values.insert(key.clone(), l.value.clone());
                meta.insert(key.clone(), l.clone());
            }
            (None, Some(r)) => {
                if sides_disagree || local.get(key).is_some_and(|v| *v != r.value) {
                    has_conflicts = true;
                }
                values.insert(key.clone(), r.value.clone());
                meta.insert(key.clone(), r.clone());
            }
            (None, None) => match (local.get(key), remote.get(key)) {
                (Some(l), Some(r)) => {
                    if l != r {
                        has_conflicts = true;
                    }
                    values.insert(key.clone(), r.clone());
                }
                (Some(l), None) => {
                    if policy == NoMetaPolicy::RemoteExceptLocalOnly {
                        values.insert(key.clone(), l.clone());
                    }
                }
                (None, Some(r)) => {
                    values.insert(key.clone(), r.clone());
                }
                (None, None) => {}
            },
        }
    }

    MergeOutcome {
        merged: (values, meta),
        has_conflicts,
    }
}

/// Merge a whole day: tombstones first, so the duplication merger sees the
/// union of deletions from both sides.
pub fn merge_day(local: &DayState, remote: &DayState, policy: NoMetaPolicy) -> MergeOutcome<DayState> {
    let deleted = merge_deleted_instances(&local.deleted_instances, &remote.deleted_instances);
    let duplicated = merge_duplicated_instances(
        &local.duplicated_instances,
        &remote.duplicated_instances,
        &deleted.merged,
    );
    let hidden = merge_hidden_routines(&local.hidden_routines, &remote.hidden_routines);
    let slots = merge_slot_overrides(
        &local.slot_overrides,
        &local.slot_meta,
        &remote.slot_overrides,
        &remote.slot_meta,
        policy,
    );
    let orders = merge_orders(
        &local.orders,
        &local.order_meta,
        &remote.orders,
        &remote.order_meta,
        policy,
    );

    let has_conflicts = deleted.has_conflicts
        || duplicated.has_conflicts
        || hidden.has_conflicts
        || slots.has_conflicts
        || orders.has_conflicts;

    let (slot_overrides, slot_meta) = slots.merged;
    let (order_values, order_meta) = orders.merged;

    MergeOutcome {
        merged: DayState {
            hidden_routines: hidden.merged,
            deleted_instances: deleted.merged,
            duplicated_instances: duplicated.merged,
            slot_overrides,
            slot_meta,
            orders: order_values,
            order_meta,
        },
        has_conflicts,
    }
}
