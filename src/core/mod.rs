//! Pure day-state primitives.
//!
//! Module hierarchy follows type dependency order:
//! - time: wall-clock stamps for LWW
//! - keys: DateKey / MonthKey identifiers
//! - day: DayState records and the monthly container
//! - sections: time-bucket validation for order/slot keys
//! - merge: the field-aware conflict resolver
//!
//! Nothing in this layer performs I/O; the store orchestrates it.

pub mod day;
pub mod keys;
pub mod merge;
pub mod sections;
pub mod time;

pub use day::{
    DayState, DeletedInstance, DeletionType, DuplicatedInstance, HiddenRoutine, KeyMeta,
    MonthlyState, STATE_VERSION, StateMetadata, new_instance_id,
};
pub use keys::{DateKey, KeyParseError, MonthKey};
pub use merge::{
    MergeOutcome, NoMetaPolicy, merge_day, merge_deleted_instances, merge_duplicated_instances,
    merge_hidden_routines, merge_orders, merge_slot_overrides,
};
pub use sections::{
    ORDER_KEY_SEPARATOR, SectionProvider, SectionValidator, StaticSections, UNPLACED_SECTION,
};
pub use time::{WallClock, now_rfc3339};
