//! Contriboost gateway — entry point.
//!
//! Starts a background task that keeps a snapshot of every Contriboost pool
//! and GoalFund across the configured EVM networks, and serves the Axum REST
//! API the web app talks to (listings, details, unsigned transactions,
//! subscriptions, identity verification and pool chat).

mod abi;
mod aggregator;
mod api;
mod cache;
mod chat;
mod config;
mod db;
mod errors;
mod models;
mod networks;
mod retry;
mod rpc;
mod status;
mod tx;
mod verification;

#[cfg(test)]
mod testutil;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post, put},
    Router,
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use aggregator::Aggregator;
use cache::ListingCache;
use config::Config;
use verification::{HttpVerifier, ProofVerifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client shared by every RPC reader and the proof verifier.
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let aggregator = Arc::new(Aggregator::over_http(
        config.networks.clone(),
        client.clone(),
        config.rpc_retry,
    )?);
    for net in config.networks.iter() {
        info!("Network {} ({}) via {}", net.name, net.chain_id, net.rpc_url);
    }

    // ─── Background refresher ─────────────────────────────
    let cache = Arc::new(ListingCache::new());
    let shutdown = CancellationToken::new();
    let refresher = tokio::spawn(cache::run(
        aggregator.clone(),
        cache.clone(),
        Duration::from_secs(config.refresh_interval_secs.max(1)),
        shutdown.clone(),
    ));

    // ─── REST API ─────────────────────────────────────────
    let verifier = config.verification.verifier_url.as_ref().map(|url| {
        let v: Arc<dyn ProofVerifier> = Arc::new(HttpVerifier::new(client.clone(), url.clone()));
        v
    });
    if verifier.is_none() {
        info!("VERIFIER_URL not set; identity verification requests will fail");
    }

    let api_state = Arc::new(api::ApiState {
        pool,
        aggregator,
        cache,
        verifier,
        verification: config.verification.clone(),
        referral_tag: config.referral_tag.clone(),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/chains", get(api::chains))
        .route("/pools", get(api::list_pools))
        .route("/pools/:network/:address", get(api::pool_detail))
        .route("/accounts/:address", get(api::account))
        .route("/stats", get(api::stats))
        .route("/tx/:network/contriboost", post(api::prepare_contriboost))
        .route("/tx/:network/goalfund", post(api::prepare_goal_fund))
        .route("/tx/:network/:address/:action", post(api::prepare_action))
        .route("/tx/:network/receipt/:hash/:kind", get(api::created_contract))
        .route("/api/subscribe", post(api::subscribe))
        .route("/api/verify", post(api::verify))
        .route("/api/verify/status/:user_id", get(api::verify_status))
        .route(
            "/chat/:network/:address",
            get(api::chat_history).post(api::chat_post),
        )
        .route(
            "/chat/:network/:address/:id",
            put(api::chat_edit).delete(api::chat_delete),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    refresher.await?;
    info!("Gateway stopped");
    Ok(())
}

/// Resolves on Ctrl-C and tells background tasks to stop.
async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutdown signal received");
    token.cancel();
}
