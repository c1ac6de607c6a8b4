// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Append-only transaction log for observability.
//!
//! Entries are appended to a daily JSONL file. Writes are best-effort by
//! contract: callers submit entries through the bounded worker in
//! `crate::txlog` and never observe failures here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::super::{Store, StoreResult};

/// One logged upstream exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionLogEntry {
    pub abha_number: Option<String>,
    /// e.g. `enroll_send_otp`, `login_verify_otp`.
    pub request_type: String,
    pub endpoint: String,
    pub request_payload: Option<Value>,
    pub response_payload: Option<Value>,
    pub response_status: u16,
    pub error_message: Option<String>,
    pub trace_id: String,
    pub latency_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl TransactionLogEntry {
    pub fn new(request_type: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            abha_number: None,
            request_type: request_type.into(),
            endpoint: endpoint.into(),
            request_payload: None,
            response_payload: None,
            response_status: 0,
            error_message: None,
            trace_id: uuid::Uuid::new_v4().to_string(),
            latency_ms: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_abha(mut self, abha_number: impl Into<String>) -> Self {
        self.abha_number = Some(abha_number.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.response_status = status;
        self
    }

    pub fn with_response(mut self, payload: Value) -> Self {
        self.response_payload = Some(payload);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_latency(mut self, latency_ms: i64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

/// Repository for transaction log entries.
pub struct TransactionLogRepository<'a> {
    store: &'a Store,
}

impl<'a> TransactionLogRepository<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Append an entry to the current day's JSONL file.
    pub fn append(&self, entry: &TransactionLogEntry) -> StoreResult<()> {
        let date = entry.created_at.format("%Y-%m-%d").to_string();
        let path = self.store.paths().txlog_file(&date);

        let mut content = self.store.read_raw(&path).unwrap_or_default();
        let line = serde_json::to_string(entry)?;

        if !content.is_empty() && !content.ends_with(b"\n") {
            content.push(b'\n');
        }
        content.extend_from_slice(line.as_bytes());
        content.push(b'\n');

        self.store.write_raw(&path, &content)
    }

    /// Read all entries for a specific date.
    pub fn read_day(&self, date: &str) -> StoreResult<Vec<TransactionLogEntry>> {
        let path = self.store.paths().txlog_file(date);
        let content = self.store.read_raw(&path)?;
        let text = String::from_utf8_lossy(&content);

        let mut entries = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorePaths;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, Store) {
        let temp = TempDir::new().unwrap();
        let store = Store::open(StorePaths::new(temp.path())).unwrap();
        (temp, store)
    }

    #[test]
    fn append_and_read_entries() {
        let (_temp, store) = test_store();
        let repo = TransactionLogRepository::new(&store);

        let first = TransactionLogEntry::new("enroll_send_otp", "/enrollment/request/otp")
            .with_abha("91123412341234")
            .with_status(200)
            .with_response(json!({"txnId": "T1"}))
            .with_latency(120);
        let second = TransactionLogEntry::new("login_verify_otp", "/profile/login/verify")
            .with_status(502)
            .with_error("upstream status 502");

        repo.append(&first).unwrap();
        repo.append(&second).unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let entries = repo.read_day(&today).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].request_type, "enroll_send_otp");
        assert_eq!(entries[0].abha_number.as_deref(), Some("91123412341234"));
        assert_eq!(entries[1].response_status, 502);
        assert_eq!(
            entries[1].error_message.as_deref(),
            Some("upstream status 502")
        );
    }

    #[test]
    fn entries_carry_generated_trace_ids() {
        let a = TransactionLogEntry::new("t", "/e");
        let b = TransactionLogEntry::new("t", "/e");
        assert_ne!(a.trace_id, b.trace_id);
    }
}
