//! Per-day override records and their monthly container.
//!
//! These are wire types: field names match the on-disk JSON exactly
//! (camelCase), unknown fields are ignored, and absent collections default to
//! empty so files written by older plugin versions keep parsing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::keys::DateKey;
use super::time::WallClock;

/// Schema version written into `metadata.version`.
pub const STATE_VERSION: &str = "1.0";

/// A routine task suppressed for one day only.
///
/// `hidden_at` / `restored_at` were introduced after the first release;
/// records without either stamp are old-style markers and mean "hidden".
/// A record whose restore stamp is newest is inactive (the routine shows
/// again) but is retained so the restore survives merges with writers that
/// have not seen it yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiddenRoutine {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_at: Option<WallClock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<WallClock>,
}

impl HiddenRoutine {
    pub fn hidden(path: impl Into<String>, instance_id: Option<String>, at: WallClock) -> Self {
        Self {
            path: path.into(),
            instance_id,
            hidden_at: Some(at),
            restored_at: None,
        }
    }

    /// Identity key for set union: one record per `(path, instanceId)`.
    pub fn identity(&self) -> (&str, Option<&str>) {
        (self.path.as_str(), self.instance_id.as_deref())
    }

    /// Newest stamp on the record; stampless legacy records sort first.
    pub fn stamp(&self) -> WallClock {
        self.hidden_at
            .into_iter()
            .chain(self.restored_at)
            .max()
            .unwrap_or_default()
    }

    /// Whether the routine is currently suppressed by this record.
    pub fn is_hidden(&self) -> bool {
        match (self.hidden_at, self.restored_at) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(hidden), Some(restored)) => hidden > restored,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionType {
    /// Hidden for the day; the task file still exists.
    Temporary,
    /// The underlying task file itself was removed.
    Permanent,
}

/// Deletion tombstone.
///
/// Never discarded by merge, only superseded by a newer stamp for the same
/// identity key. A `restored_at` newer than `deleted_at` voids the deletion
/// without losing the record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedInstance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub deletion_type: DeletionType,
    pub deleted_at: WallClock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<WallClock>,
}

impl DeletedInstance {
    /// Composite identity key: `(deletionType, path, instanceId)`.
    pub fn identity(&self) -> (DeletionType, Option<&str>, Option<&str>) {
        (
            self.deletion_type,
            self.path.as_deref(),
            self.instance_id.as_deref(),
        )
    }

    pub fn stamp(&self) -> WallClock {
        self.restored_at.map_or(self.deleted_at, |restored| {
            self.deleted_at.max(restored)
        })
    }

    /// Whether the tombstone is in force (not voided by a newer restore).
    pub fn in_force(&self) -> bool {
        self.restored_at
            .is_none_or(|restored| self.deleted_at > restored)
    }

    /// Whether this tombstone claims the given duplicated instance.
    ///
    /// Any in-force tombstone matches by instance id; permanent ones also
    /// match by the task's path or id, so a deletion observed on one device
    /// suppresses duplicates minted on another.
    pub fn suppresses(&self, dup: &DuplicatedInstance) -> bool {
        if !self.in_force() {
            return false;
        }
        if self.instance_id.as_deref() == Some(dup.instance_id.as_str()) {
            return true;
        }
        if self.deletion_type != DeletionType::Permanent {
            return false;
        }
        self.path.as_deref() == Some(dup.original_path.as_str())
            || (self.task_id.is_some() && self.task_id == dup.original_task_id)
    }
}

/// Record of a task cloned into an extra instance for the day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicatedInstance {
    pub instance_id: String,
    pub original_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_task_id: Option<String>,
    pub created_millis: WallClock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_key: Option<String>,
}

impl DuplicatedInstance {
    /// Mint a duplication record with a fresh instance id.
    pub fn new(
        original_path: impl Into<String>,
        original_task_id: Option<String>,
        created: WallClock,
        slot_key: Option<String>,
    ) -> Self {
        Self {
            instance_id: new_instance_id(),
            original_path: original_path.into(),
            original_task_id,
            created_millis: created,
            slot_key,
        }
    }
}

/// Fresh instance id for duplicated tasks.
pub fn new_instance_id() -> String {
    Uuid::new_v4().to_string()
}

/// Per-key metadata for the scalar maps; the stamp drives LWW resolution and
/// the value travels with it so a metadata winner is self-contained.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMeta<T> {
    pub value: T,
    pub updated_at: WallClock,
}

impl<T> KeyMeta<T> {
    pub fn new(value: T, updated_at: WallClock) -> Self {
        Self { value, updated_at }
    }
}

/// One calendar date's overrides layered on top of the task files.
///
/// Never physically deleted, only emptied; an empty day serializes as `{}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DayState {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hidden_routines: Vec<HiddenRoutine>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted_instances: Vec<DeletedInstance>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplicated_instances: Vec<DuplicatedInstance>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub slot_overrides: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub slot_meta: BTreeMap<String, KeyMeta<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub orders: BTreeMap<String, i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub order_meta: BTreeMap<String, KeyMeta<i64>>,
}

impl DayState {
    pub fn is_empty(&self) -> bool {
        self.hidden_routines.is_empty()
            && self.deleted_instances.is_empty()
            && self.duplicated_instances.is_empty()
            && self.slot_overrides.is_empty()
            && self.slot_meta.is_empty()
            && self.orders.is_empty()
            && self.order_meta.is_empty()
    }

    /// Whether a routine is suppressed for this day.
    ///
    /// A record without an instance id suppresses every instance of the
    /// routine; a record with one suppresses only that instance.
    pub fn is_routine_hidden(&self, path: &str, instance_id: Option<&str>) -> bool {
        self.hidden_routines.iter().any(|record| {
            record.is_hidden()
                && record.path == path
                && (record.instance_id.is_none() || record.instance_id.as_deref() == instance_id)
        })
    }

    /// Whether an in-force tombstone claims the given task instance.
    pub fn is_instance_deleted(
        &self,
        path: Option<&str>,
        task_id: Option<&str>,
        instance_id: Option<&str>,
    ) -> bool {
        self.deleted_instances.iter().any(|record| {
            if !record.in_force() {
                return false;
            }
            if instance_id.is_some() && record.instance_id.as_deref() == instance_id {
                return true;
            }
            if record.deletion_type != DeletionType::Permanent {
                return false;
            }
            (path.is_some() && record.path.as_deref() == path)
                || (task_id.is_some() && record.task_id.as_deref() == task_id)
        })
    }

    /// Manually chosen time bucket for an instance key, if any.
    pub fn effective_slot(&self, key: &str) -> Option<&str> {
        self.slot_overrides.get(key).map(String::as_str)
    }
}

/// Everything written by `metadata` in a monthly file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMetadata {
    pub version: String,
    pub last_updated: String,
}

impl Default for StateMetadata {
    fn default() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            last_updated: String::new(),
        }
    }
}

/// One `<YYYY-MM>-state.json` file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonthlyState {
    pub days: BTreeMap<DateKey, DayState>,
    pub metadata: StateMetadata,
}
