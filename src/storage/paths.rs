// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the JSON store layout.

use std::path::{Path, PathBuf};

/// Default base directory for persistent storage.
pub const DATA_ROOT: &str = "/data";

/// Storage path utilities.
#[derive(Debug, Clone)]
pub struct StorePaths {
    root: PathBuf,
}

impl Default for StorePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StorePaths {
    /// Create a new StorePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all persisted data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Identity Profile Paths ==========

    /// Directory containing all identity profiles.
    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    /// Path to a profile file, keyed by the canonical identity number.
    pub fn profile(&self, identity_key: &str) -> PathBuf {
        self.profiles_dir().join(format!("{identity_key}.json"))
    }

    // ========== Transaction Record Paths ==========

    /// Directory containing all pending/completed transactions.
    pub fn transactions_dir(&self) -> PathBuf {
        self.root.join("transactions")
    }

    /// Path to a transaction file, keyed by the secret's lookup hash.
    pub fn transaction(&self, secret_hash: &str) -> PathBuf {
        self.transactions_dir().join(format!("{secret_hash}.json"))
    }

    // ========== Transaction Log Paths ==========

    /// Directory containing append-only transaction logs.
    pub fn txlog_dir(&self) -> PathBuf {
        self.root.join("txlog")
    }

    /// Path to a daily transaction log file (JSONL format).
    pub fn txlog_file(&self, date: &str) -> PathBuf {
        self.txlog_dir().join(format!("{date}.jsonl"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_use_data_root() {
        let paths = StorePaths::default();
        assert_eq!(paths.root(), Path::new("/data"));
    }

    #[test]
    fn custom_root_for_testing() {
        let paths = StorePaths::new("/tmp/test-data");
        assert_eq!(paths.root(), Path::new("/tmp/test-data"));
        assert_eq!(
            paths.profile("91123412341234"),
            PathBuf::from("/tmp/test-data/profiles/91123412341234.json")
        );
    }

    #[test]
    fn transaction_paths_are_keyed_by_hash() {
        let paths = StorePaths::default();
        assert_eq!(paths.transactions_dir(), PathBuf::from("/data/transactions"));
        assert_eq!(
            paths.transaction("abc123"),
            PathBuf::from("/data/transactions/abc123.json")
        );
    }

    #[test]
    fn txlog_paths_are_daily_jsonl() {
        let paths = StorePaths::default();
        assert_eq!(
            paths.txlog_file("2026-02-03"),
            PathBuf::from("/data/txlog/2026-02-03.jsonl")
        );
    }
}
