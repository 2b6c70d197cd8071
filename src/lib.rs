use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio_postgres::NoTls;
use tracing::{error, info, warn};

pub mod app;
pub mod config;
pub mod domain;
pub mod push;
pub mod ratelimit;
pub mod service;
pub mod state;
pub mod store;

pub use app::app;
pub use push::{VapidCredentials, generate_vapid_credentials};

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("database connect failed: {0}")]
    Connect(tokio_postgres::Error),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Wires the store, rate limiter, dispatcher and service together and runs
/// the HTTP server until SIGINT/SIGTERM, then drains the dispatcher.
pub async fn serve(config: config::AppConfig) -> Result<(), ServeError> {
    let (client, connection) = tokio_postgres::connect(&config.database_url, NoTls)
        .await
        .map_err(ServeError::Connect)?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!("database connection error: {err}");
        }
    });

    let store: Arc<dyn store::SubscriptionStore> =
        Arc::new(store::PostgresStore::new(client).await?);

    let transport: Option<Arc<dyn push::PushTransport>> = match push::load_vapid_config(&config) {
        push::VapidConfigStatus::Ready(vapid) => Some(Arc::new(push::WebPushTransport::new(
            vapid,
            config.push_ttl_seconds,
        ))),
        push::VapidConfigStatus::Incomplete => {
            warn!("push transmission disabled: incomplete VAPID configuration");
            None
        }
        push::VapidConfigStatus::Missing => {
            warn!("push transmission disabled: no VAPID configuration");
            None
        }
    };

    let dispatcher = Arc::new(push::PushDispatcher::start(
        push::DispatcherConfig {
            worker_count: config.worker_count,
            queue_size: config.queue_size,
            max_retries: config.max_retries,
            retry_base_backoff_ms: config.retry_base_backoff_ms,
        },
        transport,
        Arc::clone(&store),
    ));

    let service = Arc::new(service::Service::new(
        config.hub_ui_code.clone(),
        config.hub_secret.clone(),
        store,
        ratelimit::RateLimiter::new(config.subscribe_rate_limit, config.subscribe_rate_window),
        Arc::clone(&dispatcher),
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {addr}");

    axum::serve(
        listener,
        app::app(state::AppState { service }).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("draining push dispatcher");
    dispatcher.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
