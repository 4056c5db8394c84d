//! Shared fixtures for store integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;

use chute_rs::{
    Config, DateKey, DayState, DayStateStore, DeletedInstance, DeletionType, KeyMeta, Result,
    StateError, StateFs, StaticSections, WallClock,
};

/// In-memory file store with write counting, optional write failure, and
/// optional listing support.
pub struct MemFs {
    pub files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    pub write_count: Mutex<usize>,
    pub fail_writes: Mutex<bool>,
    pub rejected: Mutex<Option<Vec<u8>>>,
    pub supports_list: bool,
}

impl MemFs {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            write_count: Mutex::new(0),
            fail_writes: Mutex::new(false),
            rejected: Mutex::new(None),
            supports_list: true,
        }
    }

    pub fn without_listing() -> Self {
        Self {
            supports_list: false,
            ..Self::new()
        }
    }

    pub fn writes(&self) -> usize {
        *self.write_count.lock().unwrap()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    /// Simulate an external writer replacing a file.
    pub fn put(&self, path: &Path, bytes: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), bytes.into());
    }

    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

impl StateFs for &MemFs {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        Ok(self.files.lock().unwrap().get(path).cloned())
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if *self.fail_writes.lock().unwrap() {
            *self.rejected.lock().unwrap() = Some(bytes.to_vec());
            return Err(StateError::io(
                path,
                std::io::Error::other("injected write failure"),
            ));
        }
        *self.write_count.lock().unwrap() += 1;
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn list(&self, dir: &Path) -> Result<Option<Vec<PathBuf>>> {
        if !self.supports_list {
            return Ok(None);
        }
        let files = self.files.lock().unwrap();
        Ok(Some(
            files
                .keys()
                .filter(|path| path.parent() == Some(dir))
                .cloned()
                .collect(),
        ))
    }
}

pub fn sections() -> Arc<StaticSections> {
    Arc::new(StaticSections::new(["8:00", "12:00", "16:00"]))
}

pub fn store(fs: &MemFs) -> DayStateStore<&MemFs> {
    DayStateStore::new(fs, sections(), Config::default())
}

pub fn date(key: &str) -> DateKey {
    DateKey::parse(key).unwrap()
}

pub fn tombstone(path: &str, kind: DeletionType, at: u64) -> DeletedInstance {
    DeletedInstance {
        path: Some(path.into()),
        task_id: None,
        instance_id: None,
        deletion_type: kind,
        deleted_at: WallClock(at),
        restored_at: None,
    }
}

pub fn day_with_order(key: &str, value: i64, updated_at: Option<u64>) -> DayState {
    let mut day = DayState::default();
    day.orders.insert(key.to_string(), value);
    if let Some(at) = updated_at {
        day.order_meta
            .insert(key.to_string(), KeyMeta::new(value, WallClock(at)));
    }
    day
}
