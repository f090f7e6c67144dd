use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use sales_api::auth::Authenticator;
use sales_api::config::{self, SecurityConfig};
use sales_api::handlers::{api_mux, ApiMuxConfig};
use sales_api::keystore::KeyStore;
use sales_api::metrics::ApiMetrics;
use sales_api::policy::PolicyEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up AUTH_KEYS_FOLDER, LOG_FILTER, etc.
    let _ = dotenvy::dotenv();

    // Initialize configuration (this loads the config singleton)
    let config = config::config();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .init();

    tracing::info!("Starting Sales API in {:?} mode", config.environment);

    let keys = Arc::new(
        KeyStore::load(&config.auth.keys_folder)
            .with_context(|| format!("loading keys from {}", config.auth.keys_folder))?,
    );
    if keys.get(&config.auth.active_kid).is_err() {
        tracing::warn!(kid = %config.auth.active_kid, "active key id is not in the key folder");
    }

    let engine = Arc::new(PolicyEngine::new().context("compiling policy modules")?);

    let mut authenticator = Authenticator::new(keys.clone(), config.auth.issuer.clone())
        .with_clock_skew(config.auth.clock_skew())
        .context("configuring clock skew")?;
    if config.auth.delegate_authentication {
        authenticator = authenticator.with_policy(engine.clone());
    }

    let metrics = ApiMetrics::new().context("registering metrics")?;

    let app = api_mux(&ApiMuxConfig {
        keys,
        authenticator: Arc::new(authenticator),
        engine,
        metrics,
        request_timeout: config.web.request_timeout(),
    })
    .layer(cors(&config.security))
    .layer(TraceLayer::new_for_http());

    let bind_addr = config.web.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!(addr = %bind_addr, "Sales API listening");

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.changed().await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            result??;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    tracing::info!("shutdown started");
    let _ = stop_tx.send(true);

    match tokio::time::timeout(config.web.shutdown_timeout(), server).await {
        Ok(result) => result??,
        Err(_) => tracing::warn!(
            timeout_secs = config.web.shutdown_timeout_secs,
            "graceful shutdown did not complete in time"
        ),
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn cors(security: &SecurityConfig) -> CorsLayer {
    if !security.enable_cors {
        return CorsLayer::new();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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
