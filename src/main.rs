//! Classroom poll backend entrypoint wiring REST, WebSocket and storage layers.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use classroom_poll_back::{
    config::AppConfig,
    dao::poll_store::{InMemoryPollStore, PollStore},
    routes,
    services::ticker,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let port = config.port;
    let app_state = AppState::new(config);

    spawn_storage(&app_state).await;
    tokio::spawn(ticker::run_poll_clock(app_state.clone()));
    tokio::spawn(ticker::run_liveness_ping(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Connect the durable store: MongoDB under supervision when configured, memory otherwise.
async fn spawn_storage(state: &SharedState) {
    #[cfg(feature = "mongo-store")]
    if let Some(uri) = state.config().mongo_uri.clone() {
        use classroom_poll_back::{
            dao::{
                poll_store::mongodb::{MongoConfig, MongoPollStore},
                storage::StorageError,
            },
            services::storage_supervisor,
        };

        let db_name = state.config().mongo_db.clone();
        info!("MongoDB configured; starting storage supervisor in degraded mode");
        tokio::spawn(storage_supervisor::run(state.clone(), move || {
            let uri = uri.clone();
            let db_name = db_name.clone();
            async move {
                let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
                let store = MongoPollStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn PollStore>)
            }
        }));
        return;
    }

    info!("no MongoDB URI configured; completed polls are kept in memory");
    state
        .install_poll_store(Arc::new(InMemoryPollStore::new()))
        .await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
