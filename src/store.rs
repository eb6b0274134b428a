//! Atomic read/write of the persisted pairing record, with an in-memory
//! modification-time cache so a hot reload path (the supervisor reloads
//! every tick) doesn't re-parse JSON 20 times a second.

use crate::model::PairingRecord;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("writing state file: {0}")]
    Io(#[from] std::io::Error),
    #[error("serializing state: {0}")]
    Serialize(#[from] serde_json::Error),
}

struct Cached {
    record: PairingRecord,
    mtime: Option<SystemTime>,
}

pub struct Store {
    path: PathBuf,
    cache: Mutex<Cached>,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Store {
            path: path.into(),
            cache: Mutex::new(Cached {
                record: PairingRecord::default(),
                mtime: None,
            }),
        }
    }

    /// Loads the current record. Never fails: a missing or malformed file
    /// yields an empty record (`spec.md` §4.1, §7 `StateCorrupt`).
    pub fn load(&self) -> PairingRecord {
        let mut guard = self.cache.lock().expect("store mutex poisoned");

        let on_disk_mtime = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        if on_disk_mtime.is_some() && on_disk_mtime == guard.mtime {
            return guard.record.clone();
        }

        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<PairingRecord>(&contents) {
                Ok(record) => {
                    guard.record = record.clone();
                    guard.mtime = on_disk_mtime;
                    record
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "state file malformed, treating as empty");
                    guard.record = PairingRecord::default();
                    guard.mtime = None;
                    guard.record.clone()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                guard.record = PairingRecord::default();
                guard.mtime = None;
                guard.record.clone()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file unreadable, treating as empty");
                guard.record = PairingRecord::default();
                guard.mtime = None;
                guard.record.clone()
            }
        }
    }

    /// Writes the record via `tmp → rename → fsync-dir` for crash durability.
    pub fn save(&self, record: &PairingRecord) -> Result<(), StoreError> {
        let mut guard = self.cache.lock().expect("store mutex poisoned");
        write_atomic(&self.path, record)?;

        let new_mtime = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        guard.record = record.clone();
        guard.mtime = new_mtime;
        Ok(())
    }

    /// Clears the persisted record entirely — called once at daemon startup
    /// per the `STARTUP_FORCE_UNPAIR` behavior.
    pub fn force_unpair(&self) -> Result<(), StoreError> {
        debug!("forcing unpair at startup");
        self.save(&PairingRecord::default())
    }
}

fn write_atomic(path: &Path, record: &PairingRecord) -> Result<(), StoreError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(record)?;

    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;

    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("state.json"));
        let record = store.load();
        assert!(!record.paired);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("state.json"));
        let mut record = PairingRecord::default();
        record.paired = true;
        record.paired_at = 42;
        store.save(&record).unwrap();

        let reloaded = store.load();
        assert!(reloaded.paired);
        assert_eq!(reloaded.paired_at, 42);
    }

    #[test]
    fn malformed_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"not json at all").unwrap();
        let store = Store::new(path);
        let record = store.load();
        assert!(!record.paired);
    }

    #[test]
    fn repeated_load_without_write_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = Store::new(&path);
        let mut record = PairingRecord::default();
        record.paired = true;
        store.save(&record).unwrap();

        let first = store.load();
        let second = store.load();
        assert_eq!(first.paired, second.paired);
    }
}
