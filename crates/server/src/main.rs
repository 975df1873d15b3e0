//! Crave server - food ordering API and back office.
//!
//! This binary serves the JSON API on port 3000 and runs the idle-session
//! watchdog alongside it.
//!
//! # Architecture
//!
//! - Axum web framework, JSON in and out
//! - SQLite via sqlx for accounts, menu, carts, orders and the audit log
//! - tower-sessions cookie sessions persisted in the same database
//! - A background task that force-logs-out idle sessions
//! - SMTP (lettre) for verification codes and order confirmations

#![cfg_attr(not(test), forbid(unsafe_code))]

use sentry::integrations::tracing as sentry_tracing;
use tower_sessions_sqlx_store::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crave_server::config::AppConfig;
use crave_server::services::{EmailService, SessionMonitor, audit_session_events};
use crave_server::state::AppState;
use crave_server::{db, middleware, routes};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &AppConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from environment (needed for Sentry init)
    let config = AppConfig::from_env()?;

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "crave_server=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // NOTE: Schema migrations are NOT run automatically on startup.
    // Run them explicitly via: crave migrate
    // The session store owns its table and creates it if missing.
    let session_store = SqliteStore::new(pool.clone());
    session_store.migrate().await?;

    let email = EmailService::from_config(config.email.as_ref(), &config.base_url)?;
    if config.email.is_none() {
        tracing::warn!("SMTP_HOST not set, outgoing mail is kept in the in-memory outbox");
    }

    let state = AppState::new(config.clone(), pool.clone(), email);

    // Idle-session watchdog and its audit subscriber
    let monitor = SessionMonitor::spawn(
        state.sessions().clone(),
        state.codes().clone(),
        config.session.check_interval,
    );
    let subscriber = tokio::spawn(audit_session_events(monitor.subscribe(), pool));

    let session_layer = middleware::create_session_layer(session_store, state.config());
    let app = routes::app(state, session_layer);

    let addr = config.socket_addr();
    tracing::info!("crave listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.shutdown().await;
    if let Err(e) = subscriber.await {
        tracing::error!(error = %e, "Session event subscriber failed");
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
