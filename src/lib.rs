#![forbid(unsafe_code)]

//! Day-state reconciliation engine for the chute task planner.
//!
//! Persists per-day task overrides (hidden routines, deletions, duplications,
//! slot placements, manual orderings) in monthly JSON files and keeps them
//! convergent when the same files are edited by multiple unsynchronized
//! writers sharing storage through an uncontrolled channel. Merges are
//! field-aware (OR-Set unions, tombstones, last-writer-wins maps) and happen
//! on every read of externally-changed data; the engine's own write echoes
//! are recognized by content hash and skipped.
//!
//! The host wires three collaborators: a [`store::StateFs`] for file access,
//! a [`core::SectionProvider`] for the configured time buckets, and its
//! file-change notifications into [`store::DayStateStore::consume_local_state_write`]
//! / [`store::DayStateStore::merge_external_change`].

pub mod config;
pub mod core;
pub mod error;
pub mod paths;
pub mod store;

pub use config::Config;
pub use error::StateError;
pub type Result<T> = std::result::Result<T, StateError>;

// Re-export the working set at the crate root for convenience.
pub use crate::core::{
    DateKey, DayState, DeletedInstance, DeletionType, DuplicatedInstance, HiddenRoutine, KeyMeta,
    KeyParseError, MergeOutcome, MonthKey, MonthlyState, NoMetaPolicy, STATE_VERSION,
    SectionProvider, SectionValidator, StateMetadata, StaticSections, WallClock, merge_day,
    new_instance_id,
};
pub use crate::store::{DayStateStore, DiskFs, LocalWriteTracker, MergedMonth, StateFs};
