//! Day-granular store operations: idempotent saves, read-modify-write,
//! cache invalidation, and failure rollback.

mod support;

use chute_rs::{DayState, DeletionType, HiddenRoutine, KeyMeta, WallClock};
use support::{MemFs, date, day_with_order, store, tombstone};

#[test]
fn load_day_synthesizes_empty_and_never_writes() {
    let fs = MemFs::new();
    let mut store = store(&fs);

    let day = store.load_day(&date("2026-02-19")).unwrap();
    assert!(day.is_empty());
    assert_eq!(fs.writes(), 0);
    assert!(fs.files.lock().unwrap().is_empty());
}

#[test]
fn save_day_identical_state_writes_once() {
    let fs = MemFs::new();
    let mut store = store(&fs);
    let d = date("2026-02-19");

    let mut day = DayState::default();
    day.hidden_routines
        .push(HiddenRoutine::hidden("TASKS/standup.md", None, WallClock(1)));

    store.save_day(&d, day.clone()).unwrap();
    store.save_day(&d, day.clone()).unwrap();
    store.save_day(&d, day).unwrap();

    assert_eq!(fs.writes(), 1);
}

#[test]
fn save_day_empty_state_on_missing_day_is_a_no_op() {
    let fs = MemFs::new();
    let mut store = store(&fs);

    store.save_day(&date("2026-02-19"), DayState::default()).unwrap();
    assert_eq!(fs.writes(), 0);
}

#[test]
fn save_day_persists_whole_month_in_one_write() {
    let fs = MemFs::new();
    let mut store = store(&fs);

    store
        .save_day(&date("2026-02-01"), day_with_order("a", 1, Some(10)))
        .unwrap();
    store
        .save_day(&date("2026-02-19"), day_with_order("b", 2, Some(20)))
        .unwrap();
    assert_eq!(fs.writes(), 2);

    // Both days live in the same file.
    let path = store.month_path(&date("2026-02-01").month_key());
    let body = fs.get(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(parsed["days"]["2026-02-01"].is_object());
    assert!(parsed["days"]["2026-02-19"].is_object());
    assert_eq!(parsed["metadata"]["version"], "1.0");
    assert!(parsed["metadata"]["lastUpdated"].as_str().is_some());
}

#[test]
fn update_day_persists_only_on_change() {
    let fs = MemFs::new();
    let mut store = store(&fs);
    let d = date("2026-02-19");

    let unchanged = store.update_day(&d, |_| {}).unwrap();
    assert!(unchanged.is_empty());
    assert_eq!(fs.writes(), 0);

    let changed = store
        .update_day(&d, |day| {
            day.slot_overrides
                .insert("TASKS/a.md".into(), "8:00".into());
        })
        .unwrap();
    assert_eq!(changed.effective_slot("TASKS/a.md"), Some("8:00"));
    assert_eq!(fs.writes(), 1);

    // Read-after-write through the cache.
    let loaded = store.load_day(&d).unwrap();
    assert_eq!(loaded, changed);
}

#[test]
fn merge_day_state_accumulates_unions_and_overwrites() {
    let fs = MemFs::new();
    let mut store = store(&fs);
    let d = date("2026-02-19");

    store
        .save_day(&d, day_with_order("keep-me", 5, None))
        .unwrap();

    let mut partial = DayState::default();
    partial
        .deleted_instances
        .push(tombstone("TASKS/b.md", DeletionType::Temporary, 100));
    partial.orders.insert("new-key".into(), 9);

    let merged = store.merge_day_state(&d, &partial).unwrap();
    assert_eq!(merged.orders["keep-me"], 5);
    assert_eq!(merged.orders["new-key"], 9);
    assert_eq!(merged.deleted_instances.len(), 1);

    // Idempotent: merging the same partial again changes nothing.
    let writes = fs.writes();
    let again = store.merge_day_state(&d, &partial).unwrap();
    assert_eq!(again, merged);
    assert_eq!(fs.writes(), writes);
}

#[test]
fn malformed_month_file_reads_as_empty() {
    let fs = MemFs::new();
    let mut store = store(&fs);
    let d = date("2026-02-19");
    let path = store.month_path(&d.month_key());

    fs.put(&path, &b"{ not json"[..]);

    let day = store.load_day(&d).unwrap();
    assert!(day.is_empty());

    // The engine can still write fresh state over the corrupt file.
    store.save_day(&d, day_with_order("k", 1, Some(5))).unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&fs.get(&path).unwrap()).unwrap();
    assert_eq!(parsed["days"]["2026-02-19"]["orders"]["k"], 1);
}

#[test]
fn write_failure_rolls_back_cache_and_hash_ledger() {
    let fs = MemFs::new();
    let mut store = store(&fs);
    let d = date("2026-02-19");
    let path = store.month_path(&d.month_key());
    let day = day_with_order("k", 1, Some(5));

    fs.set_fail_writes(true);
    assert!(store.save_day(&d, day.clone()).is_err());

    // The failed write's hash was discarded: the same bytes arriving as a
    // file event must be treated as external, not an echo.
    let attempted = fs.rejected.lock().unwrap().take().unwrap();
    assert!(!store.consume_local_state_write(&path, Some(&attempted), None));

    // The cache rolled back, so retrying the same save is not a no-op.
    fs.set_fail_writes(false);
    store.save_day(&d, day.clone()).unwrap();
    assert_eq!(fs.writes(), 1);
    assert_eq!(store.load_day(&d).unwrap(), day);
}

#[test]
fn clear_cache_for_date_picks_up_external_disk_state() {
    let fs = MemFs::new();
    let mut store = store(&fs);
    let d = date("2026-02-19");
    let path = store.month_path(&d.month_key());

    store.save_day(&d, day_with_order("k", 1, Some(5))).unwrap();

    // An external writer replaces the file wholesale.
    let mut month = chute_rs::MonthlyState::default();
    month.days.insert(d, day_with_order("k", 42, Some(6)));
    fs.put(&path, serde_json::to_vec_pretty(&month).unwrap());

    // Cached value still served...
    assert_eq!(store.load_day(&d).unwrap().orders["k"], 1);

    // ...until the month is invalidated.
    store.clear_cache_for_date(&d);
    assert_eq!(store.load_day(&d).unwrap().orders["k"], 42);
}

#[test]
fn day_queries_reflect_tombstones_and_meta() {
    let fs = MemFs::new();
    let mut store = store(&fs);
    let d = date("2026-02-19");

    let final_state = store
        .update_day(&d, |day| {
            day.deleted_instances
                .push(tombstone("TASKS/gone.md", DeletionType::Permanent, 50));
            day.slot_overrides
                .insert("TASKS/a.md".into(), "12:00".into());
            day.slot_meta.insert(
                "TASKS/a.md".into(),
                KeyMeta::new("12:00".into(), WallClock(50)),
            );
        })
        .unwrap();

    assert!(final_state.is_instance_deleted(Some("TASKS/gone.md"), None, None));
    assert!(!final_state.is_instance_deleted(Some("TASKS/other.md"), None, None));
    assert_eq!(final_state.effective_slot("TASKS/a.md"), Some("12:00"));
}
