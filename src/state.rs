// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared application state passed to every handler.

use std::sync::Arc;

use crate::authority::AuthorityClient;
use crate::config::AppConfig;
use crate::crypto::Vault;
use crate::storage::Store;
use crate::txlog::TxLogSender;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub authority: AuthorityClient,
    pub store: Arc<Store>,
    pub vault: Arc<Vault>,
    pub txlog: TxLogSender,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        authority: AuthorityClient,
        store: Arc<Store>,
        txlog: TxLogSender,
    ) -> Self {
        let vault = Arc::new(Vault::new(&config.vault_key));
        Self {
            config: Arc::new(config),
            authority,
            store,
            vault,
            txlog,
        }
    }
}
