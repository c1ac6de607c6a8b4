// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-file store backing the profile and transaction repositories.
//!
//! One file per record, atomic writes via temp-file rename. The store is the
//! only serialization point in the system; repositories layer typed access
//! and merge semantics on top.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use super::StorePaths;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// File-backed JSON store rooted at a [`StorePaths`].
///
/// Writers of the same logical key serialize through [`Store::key_lock`],
/// and every write lands in a uniquely-named temp file before the rename,
/// so concurrent writers never share a temp path.
#[derive(Debug, Clone)]
pub struct Store {
    paths: StorePaths,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Store {
    /// Open the store, creating the directory layout if needed.
    pub fn open(paths: StorePaths) -> StoreResult<Self> {
        let dirs = [
            paths.profiles_dir(),
            paths.transactions_dir(),
            paths.txlog_dir(),
        ];
        for dir in dirs {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            paths,
            locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Per-key writer lock. Repositories hold the guard across their
    /// read-merge-write sequence so concurrent upserts of the same key
    /// cannot interleave.
    pub fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(key.to_string()).or_default())
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Read a JSON file and deserialize it.
    pub fn read_json<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> StoreResult<T> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let value = serde_json::from_reader(reader)?;
        Ok(value)
    }

    /// Write a JSON file (atomic write via rename).
    pub fn write_json<T: Serialize>(&self, path: impl AsRef<Path>, value: &T) -> StoreResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }

        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Check if a file exists.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        File::open(path.as_ref()).is_ok()
    }

    /// Delete a file.
    pub fn delete(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        fs::remove_file(path.as_ref())?;
        Ok(())
    }

    /// List file stems in a directory with the given extension.
    pub fn list_files(&self, dir: impl AsRef<Path>, extension: &str) -> StoreResult<Vec<String>> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file()
                && path.extension().is_some_and(|ext| ext == extension)
            {
                if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// Read raw bytes from a file.
    pub fn read_raw(&self, path: impl AsRef<Path>) -> StoreResult<Vec<u8>> {
        let mut file = File::open(path.as_ref())?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Write raw bytes to a file.
    pub fn write_raw(&self, path: impl AsRef<Path>, data: &[u8]) -> StoreResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    fn test_store() -> (TempDir, Store) {
        let temp = TempDir::new().unwrap();
        let store = Store::open(StorePaths::new(temp.path())).unwrap();
        (temp, store)
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestData {
        id: String,
        value: i32,
    }

    #[test]
    fn open_creates_directories() {
        let (_temp, store) = test_store();
        assert!(store.paths().profiles_dir().exists());
        assert!(store.paths().transactions_dir().exists());
        assert!(store.paths().txlog_dir().exists());
    }

    #[test]
    fn write_and_read_json() {
        let (_temp, store) = test_store();
        let data = TestData {
            id: "test-1".to_string(),
            value: 42,
        };

        let path = store.paths().profiles_dir().join("test.json");
        store.write_json(&path, &data).unwrap();

        let read: TestData = store.read_json(&path).unwrap();
        assert_eq!(read, data);
    }

    #[test]
    fn list_files_returns_stems() {
        let (_temp, store) = test_store();

        for i in 1..=3 {
            let path = store.paths().transactions_dir().join(format!("h{i}.json"));
            store
                .write_json(
                    &path,
                    &TestData {
                        id: format!("h{i}"),
                        value: i,
                    },
                )
                .unwrap();
        }

        let ids = store
            .list_files(store.paths().transactions_dir(), "json")
            .unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&"h1".to_string()));
    }

    #[test]
    fn delete_removes_file() {
        let (_temp, store) = test_store();
        let path = store.paths().profiles_dir().join("gone.json");
        store
            .write_json(
                &path,
                &TestData {
                    id: "gone".to_string(),
                    value: 0,
                },
            )
            .unwrap();

        assert!(store.exists(&path));
        store.delete(&path).unwrap();
        assert!(!store.exists(&path));
    }

    #[test]
    fn concurrent_writes_to_one_path_never_collide() {
        let (_temp, store) = test_store();
        let path = store.paths().profiles_dir().join("shared.json");

        let store = &store;
        let path = &path;
        std::thread::scope(|s| {
            for t in 0..8 {
                s.spawn(move || {
                    for i in 0..50 {
                        store
                            .write_json(
                                path,
                                &TestData {
                                    id: format!("t{t}"),
                                    value: i,
                                },
                            )
                            .unwrap();
                    }
                });
            }
        });

        // Whichever writer renamed last, the file is whole and readable.
        let read: TestData = store.read_json(path).unwrap();
        assert!(read.id.starts_with('t'));
    }

    #[test]
    fn raw_round_trip() {
        let (_temp, store) = test_store();
        let path = store.paths().txlog_dir().join("2026-02-03.jsonl");
        store.write_raw(&path, b"line one\n").unwrap();
        assert_eq!(store.read_raw(&path).unwrap(), b"line one\n");
    }
}
