use std::time::Duration;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ink_persistence::{DatabaseManager, demo_attempts};
use ink_server::{config::Config, create_routes, state::AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Ink server...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize database connection and run migrations
    let db = match DatabaseManager::connect(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to connect to database and run migrations: {}", e);
            std::process::exit(1);
        }
    };

    if config.seed_demo_attempts {
        match demo_attempts() {
            Ok(seed) => {
                if let Err(e) = db.attempts().seed_if_empty(&seed).await {
                    warn!("Failed to seed demo attempts: {}", e);
                }
            }
            Err(e) => warn!("Failed to load demo attempts: {}", e),
        }
    }

    let state = match AppState::from_config(&config, &db) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize services: {:#}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Judging rounds with {:?}{}",
        state.judge.strategy(),
        config
            .recognition_url
            .as_deref()
            .map(|url| format!(" via {}", url))
            .unwrap_or_default()
    );

    // Expired sessions are only rejected on use, so sweep them periodically
    let auth = state.auth.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let pruned = auth.prune_expired_sessions();
            if pruned > 0 {
                info!(
                    "Pruned {} expired sessions, {} still active",
                    pruned,
                    auth.active_sessions()
                );
            }
        }
    });

    let routes = create_routes(state);

    let host = match config.host.parse::<std::net::IpAddr>() {
        Ok(host) => host,
        Err(e) => {
            error!("Invalid HOST {:?}: {}", config.host, e);
            std::process::exit(1);
        }
    };

    info!("Server starting on {}:{}", host, config.port);

    let bound = warp::serve(routes).try_bind_with_graceful_shutdown((host, config.port), shutdown_signal());
    let (addr, server) = match bound {
        Ok(bound) => bound,
        Err(e) => {
            error!("Failed to bind {}:{}: {}", host, config.port, e);
            std::process::exit(1);
        }
    };

    info!(
        "Server started successfully on {}. Press Ctrl+C to stop.",
        addr
    );
    server.await;
    info!("Server shutdown complete.");
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C elsewhere).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal as unix_signal};

        let (mut sigint, mut sigterm) = match (
            unix_signal(SignalKind::interrupt()),
            unix_signal(SignalKind::terminate()),
        ) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                std::future::pending::<()>().await;
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
            return;
        }
        info!("Received Ctrl+C, shutting down gracefully...");
    }
}
