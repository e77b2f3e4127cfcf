//! Request handlers.
//!
//! The override webhooks never answer with an error status: anything that
//! goes wrong resolves to `{"approved": true}` without a guid so the arr
//! proceeds with its own ranking. `/simulate` and `/test` report upstream
//! failures in their responses.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use picker_core::{Decision, OverrideRequest, ReleaseCandidate, Service};
use picker_engine::arr::MediaContext;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::server::AppState;

const OVERRIDE_EVENT: &str = "DownloadDecisionOverride";

/// Answer to a download decision override webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideResponse {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_release_guid: Option<String>,
    pub reason: String,
}

impl OverrideResponse {
    fn pass(reason: impl Into<String>) -> Self {
        Self {
            approved: true,
            selected_release_guid: None,
            reason: reason.into(),
        }
    }
}

impl From<Decision> for OverrideResponse {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Override { guid, reason } => Self {
                approved: true,
                selected_release_guid: Some(guid),
                reason,
            },
            Decision::PassThrough { reason, .. } => Self::pass(reason),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MediaRef {
    id: Option<u64>,
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct OverridePayload {
    event_type: Option<String>,
    movie: Option<MediaRef>,
    series: Option<MediaRef>,
    releases: Vec<ReleaseCandidate>,
}

impl OverridePayload {
    fn media(&mut self, service: Service) -> MediaRef {
        let media = match service {
            Service::Radarr => self.movie.take(),
            Service::Sonarr => self.series.take(),
        };
        media.unwrap_or_default()
    }
}

/// An error answer for `/simulate`: a status code and a message.
#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn test_connections(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut results = serde_json::Map::new();

    for service in Service::ALL {
        let status = match state.arr(service) {
            None => json!({ "status": "not configured" }),
            Some(client) => {
                let checked = async {
                    let status = client.system_status().await?;
                    let profiles = client.quality_profiles().await?;
                    Ok::<_, picker_core::PickerError>((status, profiles))
                };
                match checked.await {
                    Ok((status, profiles)) => json!({
                        "status": "ok",
                        "version": status.version,
                        "profiles": profiles.into_iter().map(|p| p.name).collect::<Vec<_>>(),
                    }),
                    Err(e) => json!({ "status": "error", "error": e.to_string() }),
                }
            }
        };
        results.insert(service.as_str().to_string(), status);
    }

    let llm = state.engine.llm();
    let llm_status = match llm.ping().await {
        Ok(()) => json!({ "status": "ok", "model": llm.model() }),
        Err(e) => json!({ "status": "error", "error": e.to_string() }),
    };
    results.insert("llm".into(), llm_status);

    let settings = state.engine.settings();
    let prompts = state.engine.prompts();
    results.insert(
        "config".into(),
        json!({
            "dry_run": settings.dry_run,
            "skip_tag": settings.skip_tag,
            "prompts_dir": prompts.root().display().to_string(),
            "radarr_profiles": prompts.profiles(Service::Radarr),
            "sonarr_profiles": prompts.profiles(Service::Sonarr),
            "radarr_configured": state.radarr.is_some(),
            "sonarr_configured": state.sonarr.is_some(),
        }),
    );

    Json(Value::Object(results))
}

pub async fn reload(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let reloaded = Arc::clone(&state);
    let count = tokio::task::spawn_blocking(move || reloaded.engine.prompts().reload())
        .await
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, format!("reload failed: {e}")))?;

    let prompts = state.engine.prompts();
    Ok(Json(json!({
        "status": "reloaded",
        "count": count,
        "radarr_profiles": prompts.profiles(Service::Radarr),
        "sonarr_profiles": prompts.profiles(Service::Sonarr),
    })))
}

pub async fn radarr_override(State(state): State<Arc<AppState>>, body: Bytes) -> Json<OverrideResponse> {
    Json(handle_override(&state, Service::Radarr, &body).await)
}

pub async fn sonarr_override(State(state): State<Arc<AppState>>, body: Bytes) -> Json<OverrideResponse> {
    Json(handle_override(&state, Service::Sonarr, &body).await)
}

async fn handle_override(state: &AppState, service: Service, body: &[u8]) -> OverrideResponse {
    let name = service.display_name();
    let Some(arr) = state.arr(service) else {
        return OverrideResponse::pass(format!("{name} not configured"));
    };

    if body.iter().all(u8::is_ascii_whitespace) {
        return OverrideResponse::pass("Empty payload");
    }
    let mut payload: OverridePayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(%service, error = %e, "unparsable webhook payload");
            return OverrideResponse::pass(format!("Invalid payload: {e}"));
        }
    };

    let event_type = payload.event_type.take().unwrap_or_default();
    if event_type != OVERRIDE_EVENT {
        return OverrideResponse::pass(format!("Ignored event type: {event_type}"));
    }

    let media = payload.media(service);
    let title = media.title.unwrap_or_else(|| "Unknown".to_string());
    let releases = std::mem::take(&mut payload.releases);
    tracing::info!(%service, media = %title, releases = releases.len(), "download decision override");

    if releases.is_empty() {
        tracing::warn!(%service, media = %title, "no releases in payload");
        return OverrideResponse::pass("No releases to evaluate");
    }

    let context = match media.id {
        Some(id) => match tokio::time::timeout(state.context_timeout, arr.media_context(id)).await {
            Ok(context) => context,
            Err(_) => {
                tracing::warn!(
                    %service,
                    id,
                    timeout = ?state.context_timeout,
                    "arr lookup timed out, using default profile"
                );
                MediaContext::default()
            }
        },
        None => MediaContext {
            profile_name: "unknown".to_string(),
            tags: BTreeSet::new(),
        },
    };

    let request = match OverrideRequest::new(service, title, context.profile_name, context.tags, releases) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(%service, error = %e, "rejecting override request");
            return OverrideResponse::pass(e.to_string());
        }
    };

    state.engine.decide(&request).await.into()
}

pub async fn simulate_radarr(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, ApiError> {
    simulate(&state, Service::Radarr, id).await
}

pub async fn simulate_sonarr(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, ApiError> {
    simulate(&state, Service::Sonarr, id).await
}

async fn simulate(state: &AppState, service: Service, id: u64) -> Result<Json<Value>, ApiError> {
    let arr = state.arr(service).ok_or_else(|| {
        ApiError(
            StatusCode::NOT_FOUND,
            format!("{} not configured", service.display_name()),
        )
    })?;

    let media = arr.media(id).await.map_err(|e| {
        ApiError(
            StatusCode::NOT_FOUND,
            format!("{} {id} not found: {e}", service.media_key()),
        )
    })?;

    let releases = arr.releases(id).await.map_err(|e| {
        ApiError(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to get releases: {e}"),
        )
    })?;
    if releases.is_empty() {
        return Err(ApiError(StatusCode::NOT_FOUND, "No releases found".into()));
    }

    let context = arr.context_for(&media).await;
    let total = releases.len();
    let title = media.display_title().to_string();
    let profile = context.profile_name.clone();

    let request = OverrideRequest::new(service, title.clone(), context.profile_name, context.tags, releases)
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let body = match state.engine.simulate(&request).await {
        Ok(choice) => {
            let selected = request.candidate_at(choice.index).map(|c| {
                json!({
                    "index": choice.index,
                    "guid": c.guid,
                    "title": c.title,
                    "size": c.size,
                    "quality": c.quality,
                    "seeders": c.seeders,
                })
            });
            json!({
                "status": "simulated",
                "title": title,
                "profile": profile,
                "selected": selected,
                "reason": choice.reason,
                "total_releases": total,
            })
        }
        Err(pass) => json!({
            "status": "passthrough",
            "title": title,
            "profile": profile,
            "cause": pass.cause,
            "reason": pass.reason,
            "total_releases": total,
        }),
    };

    Ok(Json(body))
}
