//! File-store abstraction over the host's storage.
//!
//! The engine only needs four operations; keeping them behind a trait lets
//! tests inject counting or failing stores and lets hosts route I/O through
//! their own file layer.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, io_err};

pub trait StateFs {
    /// Full contents of `path`, or `None` if it does not exist.
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Write `bytes` to `path`, creating parent directories as needed.
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Best-effort enumeration of files directly under `dir`.
    ///
    /// `Ok(None)` means the store cannot enumerate; callers fall back to a
    /// bounded probe. A missing directory is an empty listing, not an error.
    fn list(&self, dir: &Path) -> Result<Option<Vec<PathBuf>>>;
}

/// `std::fs` implementation with write-to-temp + rename for crash safety.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiskFs;

impl StateFs for DiskFs {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(path, err)),
        }
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;
        }

        let tmp_path = path.with_extension("json.tmp");
        let mut file = File::create(&tmp_path).map_err(|source| io_err(&tmp_path, source))?;
        file.write_all(bytes)
            .map_err(|source| io_err(&tmp_path, source))?;
        file.sync_all().map_err(|source| io_err(&tmp_path, source))?;

        fs::rename(&tmp_path, path).map_err(|source| io_err(path, source))?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list(&self, dir: &Path) -> Result<Option<Vec<PathBuf>>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Some(Vec::new())),
            Err(err) => return Err(io_err(dir, err)),
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| io_err(dir, source))?;
            let path = entry.path();
            if path.is_file() {
                out.push(path);
            }
        }
        Ok(Some(out))
    }
}
