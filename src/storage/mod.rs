// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Persistent Storage Module
//!
//! JSON-file persistence for identity profiles, in-flight transactions and
//! the append-only transaction log.
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   profiles/
//!     {identity_number}.json   # One record per enrolled person
//!   transactions/
//!     {secret_hash}.json       # One record per in-flight OTP exchange
//!   txlog/
//!     {date}.jsonl             # Daily transaction logs
//! ```
//!
//! Sensitive inputs are sealed with [`crate::crypto::Vault`] before they are
//! written; plaintext secrets never reach disk.

pub mod paths;
pub mod repository;
pub mod store;

pub use paths::StorePaths;
pub use repository::{
    canonical_abha, is_valid_abha, IdentityProfile, ProfileRepository, TransactionLogEntry,
    TransactionLogRepository, TransactionRecord, TransactionRepository,
};
pub use store::{Store, StoreError, StoreResult};
