//! Chat relay server
//!
//! Serves Socket.IO chat sessions and a health route on one port. Each
//! inbound chat message drives an observable agent run whose progress is
//! relayed back to the client as it happens.

mod config;
mod coordinator;
mod events;
mod queue;
mod relay;
mod routes;
mod socket;
mod state;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_runner::WorkerAgent;
use relay_core::document::FileDocumentStore;
use relay_core::SessionStore;

use crate::config::ServerConfig;
use crate::coordinator::{ChatCoordinator, CoordinatorConfig};
use crate::relay::ChannelRelay;
use crate::socket::create_socket_layer;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "chat_server=debug,agent_runner=debug,relay_core=info,tower_http=debug,socketioxide=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!("Using data directory: {:?}", config.data_dir);
    tracing::info!("Agent worker: {}", config.worker_url);

    let documents = FileDocumentStore::new(config.data_dir.join("records.json")).await?;
    let relay = Arc::new(ChannelRelay::new());
    let coordinator = ChatCoordinator::new(
        Arc::new(SessionStore::new()),
        relay.clone(),
        Arc::new(WorkerAgent::new(config.worker_url.clone())),
        CoordinatorConfig::from(&config),
    )
    .with_documents(Arc::new(documents));
    let state = AppState::new(coordinator, relay);

    let (socket_layer, _io) = create_socket_layer(state.clone());

    let app = Router::new()
        .merge(routes::health::router())
        .with_state(state)
        .layer(socket_layer)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
