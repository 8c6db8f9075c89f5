mod auth;
mod config;
mod notify;
mod push;
mod routes;
mod state;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use config::{generate_config_template, Config};
use push::{HttpPushService, NoopPushService, PushService};
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "pressmarket_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "pressmarket_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!(
        "pressmarket realtime server v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    // Push collaborator: real HTTP client when configured, no-op otherwise
    let push_service: Arc<dyn PushService> = match &config.push {
        Some(push_config) if push_config.enabled => {
            tracing::info!(base_url = %push_config.base_url, "push notifications enabled");
            Arc::new(HttpPushService::new(
                push_config.base_url.clone(),
                push_config.api_key.clone(),
                Duration::from_secs(push_config.timeout_secs),
            )?)
        }
        _ => {
            tracing::info!("push notifications disabled");
            Arc::new(NoopPushService)
        }
    };

    // Build application state: both registries start empty
    let app_state = AppState::new(
        config.jwt_secret.clone().into_bytes(),
        push_service,
        Duration::from_secs(config.sweep_interval_secs),
    );

    // Spawn the liveness sweeper
    let sweeper = ws::sweeper::spawn(app_state.clone());

    // Build router
    let app = routes::build_router(app_state.clone());

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Teardown: stop sweeping, close every live connection, drop all state
    sweeper.abort();
    app_state.shutdown("server shutting down");
    tracing::info!("pressmarket realtime server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
