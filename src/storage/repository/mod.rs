// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the JSON-file store.
//!
//! Each repository covers one entity type and layers its merge and lookup
//! semantics on top of the raw [`super::Store`] operations.

pub mod profiles;
pub mod transactions;
pub mod txlog;

pub use profiles::{canonical_abha, is_valid_abha, IdentityProfile, ProfileRepository};
pub use transactions::{TransactionRecord, TransactionRepository};
pub use txlog::{TransactionLogEntry, TransactionLogRepository};
