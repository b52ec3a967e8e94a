//! Eligibility HTTP Server
//!
//! ```text
//! eligibility-server
//!  ├── REST API (bearer auth, see `api`)
//!  │   └── handlers → EligibilityService → SQLite
//!  └── Policy listener (optional)
//!      └── policy change → recompute verdicts
//! ```
//!
//! Key invariants:
//! - One service object per process, shared by every handler
//! - Runs execute on the blocking pool, never on the async workers

use crate::api::{self, ApiState};
use crate::auth::TokenAuth;
use crate::config::EngineConfig;
use crate::coordinator::spawn_policy_listener;
use crate::service::EligibilityService;
use crate::storage::{EligibilityStore, SqliteStore};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

// ============================================================================
// APPLICATION
// ============================================================================

/// Build the shared API state over `store`.
///
/// Spawns the policy listener when `recompute_on_policy_change` is set, so
/// this must run inside a tokio runtime.
pub fn build_state(
    config: &EngineConfig,
    store: Arc<dyn EligibilityStore>,
) -> anyhow::Result<Arc<ApiState>> {
    let service = Arc::new(EligibilityService::new(store, &config.eligibility)?);

    if config.eligibility.recompute_on_policy_change {
        spawn_policy_listener(service.coordinator().clone(), service.policies().subscribe());
        info!("Policy listener started");
    }

    let auth = TokenAuth::with_tokens(&config.auth.tokens);
    Ok(Arc::new(ApiState::new(service, auth)))
}

/// API router with request tracing and permissive CORS
pub fn build_app(state: Arc<ApiState>) -> Router {
    api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

// ============================================================================
// SERVER STARTUP
// ============================================================================

pub async fn run_server(config: EngineConfig) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::open(&config.storage.path)?);
    let state = build_state(&config, store)?;
    let app = build_app(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let db_path = config.storage.path.display().to_string();
    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║            Worker Eligibility - Threshold Service            ║");
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║  Listening on: {:45} ║", addr);
    info!("║  Database:     {:45} ║", db_path);
    info!("║  Quorum:       {:<45} ║", config.eligibility.quorum);
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║  Endpoints:                                                  ║");
    info!("║    GET  /health                  - Health check              ║");
    info!("║    GET  /threshold-settings      - Current policy            ║");
    info!("║    PUT  /threshold-settings      - Update policy             ║");
    info!("║    POST /eligibility/update      - Recompute verdicts        ║");
    info!("║    GET  /eligibility/runs/latest - Last run                  ║");
    info!("║    GET  /tester-analysis         - Accuracy and verdicts     ║");
    info!("║    GET  /test-results            - Results with status       ║");
    info!("║    POST /test-results            - Record a result           ║");
    info!("║    POST /workers                 - Register a worker         ║");
    info!("╚══════════════════════════════════════════════════════════════╝");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
