// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use storefront_access::{
    api::router,
    auth::JwksManager,
    config::Config,
    logging::init_logging,
    rbac::run_sweeper,
    state::{AppState, AuthConfig},
    storage::{FileStorage, PlatformDb, StoragePaths, UserRepository},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(config.log_format);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let paths = StoragePaths::new(&config.data_dir);
    let mut files = FileStorage::new(paths.clone());
    files.initialize()?;
    let db = PlatformDb::open(&paths.database_file())?;
    info!(data_dir = %config.data_dir.display(), "Storage initialized");

    let jwks = match &config.jwks_url {
        Some(url) => Some(JwksManager::new(url.as_str())?),
        None if cfg!(feature = "dev") => {
            warn!("No JWKS_URL configured; accepting unsigned tokens (dev build)");
            None
        }
        None => return Err("JWKS_URL is required".into()),
    };

    if let Some(user_id) = &config.seed_super_admin {
        let (previous, _) = UserRepository::new(&db).set_super_admin(user_id, true)?;
        if !previous {
            info!(user_id = %user_id, "Seeded super-admin");
        }
    }

    let state = AppState::new(db, files)
        .with_auth_config(AuthConfig {
            jwks,
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
        })
        .with_context_cache(config.context_cache_capacity, config.context_cache_ttl)
        .with_default_custom_role_limit(config.default_custom_role_limit);

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(run_sweeper(
        state.contexts.clone(),
        config.context_cache_ttl,
        shutdown.clone(),
    ));

    let app = router(state);
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Storefront access server listening (docs at /docs)");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = sweeper.await;
    info!("Server stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
