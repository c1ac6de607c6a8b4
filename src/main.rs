// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{env, net::SocketAddr, process::ExitCode, sync::Arc};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use abha_gateway::{
    api::router,
    authority::AuthorityClient,
    config::{AppConfig, DATA_DIR_ENV},
    state::AppState,
    storage::{Store, StorePaths},
    txlog,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let format = env::var("LOG_FORMAT").unwrap_or_default();
    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "configuration error");
            return ExitCode::FAILURE;
        }
    };

    let data_dir = env::var(DATA_DIR_ENV).unwrap_or_else(|_| "/data".to_string());
    let store = match Store::open(StorePaths::new(&data_dir)) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(%err, %data_dir, "failed to open data store");
            return ExitCode::FAILURE;
        }
    };

    let authority = match AuthorityClient::new(&config) {
        Ok(client) => client,
        Err(err) => {
            error!(%err, "failed to build authority client");
            return ExitCode::FAILURE;
        }
    };

    let (txlog_sender, txlog_handle) = txlog::spawn(store.clone(), config.txlog_queue_depth);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(%err, host = %config.host, port = config.port, "invalid bind address");
            return ExitCode::FAILURE;
        }
    };

    let state = AppState::new(config, authority, store, txlog_sender);
    let app = router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%err, %addr, "failed to bind");
            return ExitCode::FAILURE;
        }
    };

    info!(%addr, %data_dir, "abha-gateway listening (docs at /docs)");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(%err, "server error");
        return ExitCode::FAILURE;
    }

    // The sender inside AppState is dropped with the router; wait for the
    // log worker to flush its queue before exiting.
    if let Err(err) = txlog_handle.await {
        error!(%err, "transaction log worker terminated abnormally");
    }

    info!("shutdown complete");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received terminate signal"),
    }
}
