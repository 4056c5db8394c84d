//! Monthly state-file naming under the log base directory.

use std::path::{Path, PathBuf};

use crate::core::MonthKey;

/// Suffix appended to a month key to form the state file name.
pub const STATE_FILE_SUFFIX: &str = "-state.json";

/// `<base>/<YYYY-MM>-state.json`
pub fn state_file_path(base: &Path, month: &MonthKey) -> PathBuf {
    base.join(format!("{month}{STATE_FILE_SUFFIX}"))
}

/// Recover the month key from a state file path, if it names one.
pub fn month_key_for_path(path: &Path) -> Option<MonthKey> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(STATE_FILE_SUFFIX)?;
    MonthKey::parse(stem).ok()
}
