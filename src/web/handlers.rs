use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ApiResponse, AppState, HealthResponse, HttpError};
use crate::models::{RuntimeMessage, SearchRequest, SearchSettings, SessionId};
use crate::storage::StateSnapshot;
use crate::stores::StoreSummary;

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub term: String,
    #[serde(default)]
    pub settings: SearchSettings,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Accepted {
    pub session: Option<SessionId>,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

pub async fn list_stores(State(state): State<AppState>) -> Json<ApiResponse<Vec<StoreSummary>>> {
    Json(ApiResponse::success(state.registry.summaries()))
}

pub async fn start_search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<(StatusCode, Json<ApiResponse<Accepted>>), HttpError> {
    let request = SearchRequest::new(body.term, body.settings)?;
    tracing::info!("Search requested over HTTP: '{}'", request.term);

    let session = state.coordinator.search(request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(Accepted { session: Some(session) })),
    ))
}

/// Accepts any runtime message: searches, and store reports from content
/// scripts running in a real browser. Unknown actions are acknowledged.
pub async fn deliver_message(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<ApiResponse<Accepted>>), HttpError> {
    let message = RuntimeMessage::from_value(body)?;
    let session = state.coordinator.deliver(message).await?;
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(Accepted { session }))))
}

pub async fn current_results(State(state): State<AppState>) -> Result<Json<StateSnapshot>, HttpError> {
    Ok(Json(state.shared.snapshot().await?))
}
