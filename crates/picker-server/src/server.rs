//! HTTP server setup and lifecycle.
//!
//! Provides [`AppState`], the [`build_router`] used by both the binary and
//! the router tests, and [`run_server`] which binds and serves until
//! Ctrl-C or SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use picker_core::{PickerConfig, PickerError, Service};
use picker_engine::arr::ArrClient;
use picker_engine::engine::{DecisionEngine, EngineSettings};
use picker_engine::llm::LlmClient;
use picker_engine::notify::NtfyNotifier;
use picker_engine::store::PromptStore;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::routes;

/// Upper bound on the arr lookups a webhook makes before asking the LLM.
pub const MAX_CONTEXT_LOOKUP: Duration = Duration::from_secs(3);

/// Budget for resolving a webhook's profile and tags: a tenth of the LLM
/// timeout, capped at [`MAX_CONTEXT_LOOKUP`].
pub fn context_lookup_budget(llm_timeout: Duration) -> Duration {
    (llm_timeout / 10).min(MAX_CONTEXT_LOOKUP)
}

/// Shared state behind every handler.
pub struct AppState {
    pub engine: DecisionEngine,
    pub radarr: Option<ArrClient>,
    pub sonarr: Option<ArrClient>,
    /// Deadline for the arr calls made on the webhook path.
    pub context_timeout: Duration,
}

impl AppState {
    pub fn new(engine: DecisionEngine, radarr: Option<ArrClient>, sonarr: Option<ArrClient>) -> Self {
        let context_timeout = context_lookup_budget(engine.settings().llm_timeout);
        Self {
            engine,
            radarr,
            sonarr,
            context_timeout,
        }
    }

    /// Wire up the real collaborators: prompt store, LLM client, ntfy
    /// notifier, and one arr client per configured service.
    ///
    /// # Errors
    ///
    /// Returns [`PickerError::Config`] if an HTTP client cannot be built.
    pub fn from_config(config: &PickerConfig) -> Result<Self, PickerError> {
        let prompts = Arc::new(PromptStore::load(&config.prompts_dir));
        let llm = Arc::new(LlmClient::new(&config.llm)?);
        let notifier = Arc::new(NtfyNotifier::new(&config.ntfy)?);
        let engine = DecisionEngine::new(prompts, llm, notifier, EngineSettings::from_config(config));

        let client_for = |service: Service| -> Result<Option<ArrClient>, PickerError> {
            config
                .arr(service)
                .map(|arr| ArrClient::new(service, arr))
                .transpose()
        };

        Ok(Self::new(
            engine,
            client_for(Service::Radarr)?,
            client_for(Service::Sonarr)?,
        ))
    }

    /// The arr client for `service`, if configured.
    pub fn arr(&self, service: Service) -> Option<&ArrClient> {
        match service {
            Service::Radarr => self.radarr.as_ref(),
            Service::Sonarr => self.sonarr.as_ref(),
        }
    }
}

/// Build the application router.
///
/// At most `max_concurrent_requests` webhook and simulate requests are
/// handled at once; further ones wait for a slot. `/health`, `/test` and
/// `/reload` are never queued behind them.
pub fn build_router(state: Arc<AppState>, max_concurrent_requests: usize) -> Router {
    let decisions = Router::new()
        .route("/hook/radarr/override", post(routes::radarr_override))
        .route("/hook/sonarr/override", post(routes::sonarr_override))
        .route("/simulate/radarr/:id", get(routes::simulate_radarr))
        .route("/simulate/sonarr/:id", get(routes::simulate_sonarr))
        .layer(GlobalConcurrencyLimitLayer::new(max_concurrent_requests.max(1)));

    Router::new()
        .route("/health", get(routes::health))
        .route("/test", get(routes::test_connections))
        .route("/reload", post(routes::reload))
        .merge(decisions)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until a shutdown signal arrives.
///
/// # Errors
///
/// Returns [`PickerError::Io`] if the address cannot be bound or the
/// server fails.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use picker_core::PickerConfig;
/// use picker_server::server::{run_server, AppState};
///
/// # async fn example() -> Result<(), picker_core::PickerError> {
/// let config = PickerConfig::from_env()?;
/// let state = Arc::new(AppState::from_config(&config)?);
/// run_server("0.0.0.0:8080".parse().unwrap(), state, 8).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_server(
    addr: SocketAddr,
    state: Arc<AppState>,
    max_concurrent_requests: usize,
) -> Result<(), PickerError> {
    let router = build_router(state, max_concurrent_requests);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
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
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
