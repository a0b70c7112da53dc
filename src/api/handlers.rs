use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::RequestId;
use crate::models::{InteractionKind, RecommendationItem, UserId, UserRatings};
use crate::services::RecommendationResponse;

use super::AppState;

/// User id assumed when a client does not send one
const DEFAULT_USER_ID: UserId = 1;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct InteractRequest {
    #[serde(rename = "type", default = "unknown")]
    pub kind: String,
    pub user_id: Option<UserId>,
    #[serde(default = "unknown")]
    pub device: String,
}

fn unknown() -> String {
    "unknown".to_string()
}

#[derive(Debug, Deserialize)]
pub struct RecommendQuery {
    pub count: Option<i64>,
    pub user_id: Option<UserId>,
}

/// Item as served over HTTP
#[derive(Debug, Serialize, PartialEq)]
pub struct ItemResponse {
    pub id: u32,
    pub title: String,
    pub genres: String,
    pub score: f64,
    pub source: String,
}

impl From<&RecommendationItem> for ItemResponse {
    fn from(item: &RecommendationItem) -> Self {
        Self {
            id: item.id,
            title: item.title.clone(),
            genres: item.genres_joined(),
            score: item.score,
            source: item.source_label.clone(),
        }
    }
}

fn items(response: &RecommendationResponse) -> Vec<ItemResponse> {
    response.items.iter().map(ItemResponse::from).collect()
}

#[derive(Debug, Serialize)]
pub struct InteractResponse {
    pub status: &'static str,
    pub message: String,
    pub interaction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<ItemResponse>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub status: &'static str,
    pub user_id: UserId,
    pub count: usize,
    pub fallback: bool,
    pub recommendations: Vec<ItemResponse>,
}

// Handlers

/// Service banner
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Marquee recommendation API",
        "status": "running",
        "endpoints": {
            "/health": "Health check",
            "/api/interact": "Handle device interactions",
            "/api/recommend": "Get recommendations",
            "/api/status": "Get device and system status"
        }
    }))
}

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Runs the handler matching a device interaction
pub async fn interact(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<InteractRequest>,
) -> Json<InteractResponse> {
    let received = state.note_interaction();
    let user_id = request.user_id.unwrap_or(DEFAULT_USER_ID);
    tracing::info!(
        request_id = %request_id,
        interaction = %request.kind,
        device = %request.device,
        user_id,
        received,
        "Device interaction received"
    );

    let ratings = UserRatings::new();
    let orchestrator = &state.orchestrator;
    let response = match InteractionKind::parse(&request.kind) {
        Some(InteractionKind::Voice) => Some(orchestrator.handle_voice(user_id, &ratings).await),
        Some(InteractionKind::Tilt) => Some(orchestrator.handle_tilt(user_id, &ratings).await),
        Some(InteractionKind::Button) => Some(orchestrator.handle_button(user_id, &ratings).await),
        Some(InteractionKind::MultiSensory) => {
            Some(orchestrator.handle_multi_sensory(user_id, &ratings).await)
        }
        None => None,
    };

    Json(match response {
        Some(response) => InteractResponse {
            status: "success",
            recommendations: Some(items(&response)),
            fallback: Some(response.is_fallback()),
            message: response.status,
            interaction: request.kind,
        },
        None => InteractResponse {
            status: "success",
            message: "Interaction received".to_string(),
            interaction: request.kind,
            recommendations: None,
            fallback: None,
        },
    })
}

/// Recommendations for a user, backend picked by policy
pub async fn recommend(
    State(state): State<AppState>,
    Query(query): Query<RecommendQuery>,
) -> AppResult<Json<RecommendResponse>> {
    let count = query
        .count
        .unwrap_or(state.orchestrator.config().recommendation_count as i64);
    if count <= 0 {
        return Err(AppError::InvalidInput(format!(
            "count must be positive, got {}",
            count
        )));
    }
    let user_id = query.user_id.unwrap_or(DEFAULT_USER_ID);

    let response = state
        .orchestrator
        .handle_recommend_count(user_id, &UserRatings::new(), count as usize)
        .await;
    let recommendations = items(&response);

    Ok(Json(RecommendResponse {
        status: "success",
        user_id,
        count: recommendations.len(),
        fallback: response.is_fallback(),
        recommendations,
    }))
}

/// Device snapshot plus executor health
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.device.read();
    let executor = state.orchestrator.executor();

    Json(json!({
        "status": "running",
        "iot_interactions": state.interactions_received(),
        "total_interactions": snapshot.counters.total_interactions(),
        "server_time": Utc::now().to_rfc3339(),
        "started_at": state.started_at.to_rfc3339(),
        "active_devices": 1,
        "backends_available": state.orchestrator.has_backends(),
        "backend_timeouts": executor.timeouts(),
        "lingering_computations": executor.lingering(),
        "device": snapshot,
    }))
}
