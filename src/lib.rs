// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ABHA Gateway - Enrollment & Credential Exchange Orchestrator
//!
//! This crate brokers enrollment, visual-credential fetch, and
//! identity-linked login against the external ABDM health-identity
//! authority, persisting profiles and transaction state in a local
//! JSON store.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `authority` - Upstream authority client (session tokens, JSON, assets)
//! - `crypto` - RSA-OAEP payload encryption and the at-rest secret vault
//! - `enroll` / `login` / `credentials` - Flow orchestrators
//! - `storage` - Atomic JSON file store and repositories
//! - `txlog` - Asynchronous transaction audit log

pub mod api;
pub mod authority;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod enroll;
pub mod error;
pub mod login;
pub mod state;
pub mod storage;
pub mod txlog;
