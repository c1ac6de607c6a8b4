// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction record repository.
//!
//! One record per in-flight OTP exchange, keyed by the SHA-256 hash of the
//! plaintext secret. The hash is unique: re-submitting the same secret before
//! verification updates the pending record (OTP resend) instead of creating a
//! second one. Records are updated exactly once on successful verification,
//! linking the identity number and the downstream business record.

use std::sync::PoisonError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::super::{Store, StoreError, StoreResult};
use super::profiles::canonical_abha;

/// One in-flight multi-step exchange with the authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Local record id.
    pub id: String,
    /// Authority-issued transaction id (opaque).
    pub txn_id: String,
    pub tenant_id: String,
    /// Sealed (AES-GCM, base64) copy of the sensitive input. Never plaintext.
    pub sealed_secret: String,
    /// Deterministic lookup hash of the plaintext (the file key).
    pub secret_hash: String,
    /// Identity number linked on successful verification.
    pub abha_number: Option<String>,
    /// Downstream business record id linked on successful verification.
    pub individual_id: Option<String>,
    pub created_by: String,
    pub last_modified_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

/// Repository for transaction records.
pub struct TransactionRepository<'a> {
    store: &'a Store,
}

impl<'a> TransactionRepository<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Create or refresh the pending transaction for a secret hash.
    ///
    /// Idempotent for resend: the same hash overwrites the authority
    /// transaction id and the sealed ciphertext, and un-deletes the row.
    /// Returns the local record id.
    pub fn upsert_on_otp(
        &self,
        tenant_id: &str,
        txn_id: &str,
        sealed_secret: &str,
        secret_hash: &str,
        actor: &str,
    ) -> StoreResult<String> {
        let path = self.store.paths().transaction(secret_hash);
        let now = Utc::now();

        let lock = self.store.key_lock(secret_hash);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let record = if self.store.exists(&path) {
            let mut existing: TransactionRecord = self.store.read_json(&path)?;
            existing.txn_id = txn_id.to_string();
            existing.sealed_secret = sealed_secret.to_string();
            existing.last_modified_by = actor.to_string();
            existing.updated_at = now;
            existing.deleted = false;
            existing
        } else {
            TransactionRecord {
                id: Uuid::new_v4().to_string(),
                txn_id: txn_id.to_string(),
                tenant_id: tenant_id.to_string(),
                sealed_secret: sealed_secret.to_string(),
                secret_hash: secret_hash.to_string(),
                abha_number: None,
                individual_id: None,
                created_by: actor.to_string(),
                last_modified_by: actor.to_string(),
                created_at: now,
                updated_at: now,
                deleted: false,
            }
        };

        self.store.write_json(&path, &record)?;
        Ok(record.id)
    }

    /// Link identity number and downstream record id on successful verify.
    pub fn update_on_verify(
        &self,
        txn_id: &str,
        individual_id: &str,
        abha_number: &str,
        actor: &str,
    ) -> StoreResult<()> {
        let found = self.find_by_txn(txn_id)?;

        let lock = self.store.key_lock(&found.secret_hash);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Re-read under the lock so a concurrent resend is not overwritten.
        let path = self.store.paths().transaction(&found.secret_hash);
        let mut record: TransactionRecord = self.store.read_json(&path)?;
        record.individual_id = Some(individual_id.to_string());
        record.abha_number = Some(abha_number.to_string());
        record.last_modified_by = actor.to_string();
        record.updated_at = Utc::now();

        self.store.write_json(&path, &record)
    }

    /// Sealed secret for a given authority transaction id.
    pub fn sealed_secret_by_txn(&self, txn_id: &str) -> StoreResult<String> {
        Ok(self.find_by_txn(txn_id)?.sealed_secret)
    }

    /// Sealed secret for a given identity number (any grouping format),
    /// preferring the most recently modified record.
    pub fn sealed_secret_by_abha(&self, abha_number: &str) -> StoreResult<String> {
        let wanted = canonical_abha(abha_number);
        let mut best: Option<TransactionRecord> = None;

        for hash in self
            .store
            .list_files(self.store.paths().transactions_dir(), "json")?
        {
            let record: TransactionRecord =
                self.store.read_json(self.store.paths().transaction(&hash))?;
            let matches = record
                .abha_number
                .as_deref()
                .is_some_and(|a| canonical_abha(a) == wanted);
            if matches && best.as_ref().is_none_or(|b| record.updated_at > b.updated_at) {
                best = Some(record);
            }
        }

        best.map(|r| r.sealed_secret)
            .ok_or_else(|| StoreError::NotFound(format!("transaction for {abha_number}")))
    }

    fn find_by_txn(&self, txn_id: &str) -> StoreResult<TransactionRecord> {
        for hash in self
            .store
            .list_files(self.store.paths().transactions_dir(), "json")?
        {
            let record: TransactionRecord =
                self.store.read_json(self.store.paths().transaction(&hash))?;
            if record.txn_id == txn_id {
                return Ok(record);
            }
        }
        Err(StoreError::NotFound(format!("transaction {txn_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorePaths;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, Store) {
        let temp = TempDir::new().unwrap();
        let store = Store::open(StorePaths::new(temp.path())).unwrap();
        (temp, store)
    }

    #[test]
    fn resend_updates_pending_transaction_in_place() {
        let (_temp, store) = test_store();
        let repo = TransactionRepository::new(&store);

        let first = repo
            .upsert_on_otp("default", "T1", "sealed-1", "hash-a", "system")
            .unwrap();
        let second = repo
            .upsert_on_otp("default", "T2", "sealed-2", "hash-a", "system")
            .unwrap();

        // Same local record, refreshed authority txn id and ciphertext.
        assert_eq!(first, second);
        let ids = store
            .list_files(store.paths().transactions_dir(), "json")
            .unwrap();
        assert_eq!(ids.len(), 1);

        let sealed = repo.sealed_secret_by_txn("T2").unwrap();
        assert_eq!(sealed, "sealed-2");
        assert!(repo.sealed_secret_by_txn("T1").is_err());
    }

    #[test]
    fn distinct_secrets_create_distinct_records() {
        let (_temp, store) = test_store();
        let repo = TransactionRepository::new(&store);

        repo.upsert_on_otp("default", "T1", "s1", "hash-a", "system")
            .unwrap();
        repo.upsert_on_otp("default", "T2", "s2", "hash-b", "system")
            .unwrap();

        let ids = store
            .list_files(store.paths().transactions_dir(), "json")
            .unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn verify_links_identity_and_downstream_record() {
        let (_temp, store) = test_store();
        let repo = TransactionRepository::new(&store);

        repo.upsert_on_otp("default", "T1", "s1", "hash-a", "system")
            .unwrap();
        repo.update_on_verify("T1", "ind-1", "91-1234-1234-1234", "system")
            .unwrap();

        let sealed = repo.sealed_secret_by_abha("91123412341234").unwrap();
        assert_eq!(sealed, "s1");
    }

    #[test]
    fn verify_unknown_txn_is_not_found() {
        let (_temp, store) = test_store();
        let repo = TransactionRepository::new(&store);
        assert!(matches!(
            repo.update_on_verify("missing", "i", "a", "system"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn abha_lookup_prefers_most_recent_record() {
        let (_temp, store) = test_store();
        let repo = TransactionRepository::new(&store);

        repo.upsert_on_otp("default", "T1", "older", "hash-a", "system")
            .unwrap();
        repo.update_on_verify("T1", "ind-1", "91123412341234", "system")
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));

        repo.upsert_on_otp("default", "T2", "newer", "hash-b", "system")
            .unwrap();
        repo.update_on_verify("T2", "ind-2", "91-1234-1234-1234", "system")
            .unwrap();

        assert_eq!(repo.sealed_secret_by_abha("91123412341234").unwrap(), "newer");
    }
}
