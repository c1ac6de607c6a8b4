// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Background transaction-log worker.
//!
//! Handlers record upstream exchanges fire-and-forget: entries go through a
//! bounded channel and are written by a single background task. A full queue
//! drops the entry with a warning rather than blocking request handling.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::storage::{Store, TransactionLogEntry, TransactionLogRepository};

/// Cloneable handle for submitting log entries.
#[derive(Debug, Clone)]
pub struct TxLogSender {
    tx: mpsc::Sender<TransactionLogEntry>,
}

impl TxLogSender {
    /// Submit an entry without waiting. Dropped if the queue is full or the
    /// worker has stopped.
    pub fn record(&self, entry: TransactionLogEntry) {
        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(entry)) => {
                warn!(
                    request_type = %entry.request_type,
                    "transaction log queue full, dropping entry"
                );
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                warn!(
                    request_type = %entry.request_type,
                    "transaction log worker stopped, dropping entry"
                );
            }
        }
    }
}

/// Spawn the log worker. The worker drains until every sender is dropped,
/// so pending entries are flushed on shutdown.
pub fn spawn(store: Arc<Store>, queue_depth: usize) -> (TxLogSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<TransactionLogEntry>(queue_depth);

    let handle = tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            let repo = TransactionLogRepository::new(&store);
            if let Err(err) = repo.append(&entry) {
                warn!(error = %err, request_type = %entry.request_type, "failed to append transaction log entry");
            } else {
                debug!(request_type = %entry.request_type, endpoint = %entry.endpoint, "transaction log entry written");
            }
        }
        debug!("transaction log worker stopped");
    });

    (TxLogSender { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorePaths;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn entries_are_flushed_before_worker_exit() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(Store::open(StorePaths::new(temp.path())).unwrap());

        let (sender, handle) = spawn(Arc::clone(&store), 16);
        sender.record(TransactionLogEntry::new("enroll_send_otp", "/enrollment/request/otp"));
        sender.record(TransactionLogEntry::new("login_send_otp", "/profile/login/request/otp"));

        drop(sender);
        handle.await.unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let entries = TransactionLogRepository::new(&store)
            .read_day(&today)
            .unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel::<TransactionLogEntry>(1);
        let sender = TxLogSender { tx };

        // Nothing is draining the receiver, so the second entry overflows.
        sender.record(TransactionLogEntry::new("a", "/a"));
        sender.record(TransactionLogEntry::new("b", "/b"));
    }
}
