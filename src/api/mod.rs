//! HTTP/JSON boundary for the fixture store.
//!
//! Handlers only translate: request → store call → response. All validation
//! lives in the model and the match state engine.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;

pub use error::ApiError;

use crate::fixture::{EventList, Fixture, FixtureStatus, InvalidRecord, MatchEvent, StatusUpdate};
use crate::store::{FixtureStore, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub store: FixtureStore,
}

/// Build the Axum router for the fixture API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/fixtures", get(list_handler))
        .route("/fixture", post(create_handler))
        .route("/fixture/:id", get(get_handler).delete(delete_handler))
        .route("/fixture/:id/events/:list", post(append_event_handler))
        .route("/fixture/:id/clock", put(clock_handler))
        .route("/fixture/:id/match-status", put(match_status_handler))
        .route("/fixture/:id/period", put(period_handler))
        .route("/fixture/:id/fixture-status", put(fixture_status_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Acknowledgement for create and delete.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub fixture_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockRequest {
    pub game_time_in_seconds: i64,
}

#[derive(Debug, Deserialize)]
pub struct PeriodRequest {
    pub period: String,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    fixtures: usize,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::InvalidRequest(e.body_text()))
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> Result<Json<Health>, ApiError> {
    let fixtures = state.store.count().await?;
    Ok(Json(Health {
        status: "ok",
        fixtures,
    }))
}

/// GET /fixtures
async fn list_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Fixture>>, ApiError> {
    Ok(Json(state.store.list_all().await?))
}

/// POST /fixture
async fn create_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Fixture>, JsonRejection>,
) -> Result<Json<Ack>, ApiError> {
    let Json(record) = payload
        .map_err(|e| StoreError::InvalidRecord(InvalidRecord::new("body", e.body_text())))?;
    let fixture_id = state.store.create(record).await?;
    Ok(Json(Ack {
        fixture_id,
        status: "created".into(),
    }))
}

/// GET /fixture/:id
async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Fixture>, ApiError> {
    Ok(Json(state.store.get(&id).await?))
}

/// DELETE /fixture/:id
async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    state.store.delete(&id).await?;
    Ok(Json(Ack {
        fixture_id: id,
        status: "deleted".into(),
    }))
}

/// POST /fixture/:id/events/:list
async fn append_event_handler(
    State(state): State<Arc<AppState>>,
    Path((id, list)): Path<(String, String)>,
    payload: Result<Json<MatchEvent>, JsonRejection>,
) -> Result<Json<Fixture>, ApiError> {
    let list: EventList = list.parse()?;
    let event = body(payload)?;
    Ok(Json(state.store.append_event(&id, list, event).await?))
}

/// PUT /fixture/:id/clock
async fn clock_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<ClockRequest>, JsonRejection>,
) -> Result<Json<Fixture>, ApiError> {
    let req = body(payload)?;
    Ok(Json(
        state
            .store
            .advance_clock(&id, req.game_time_in_seconds)
            .await?,
    ))
}

/// PUT /fixture/:id/match-status
async fn match_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Fixture>, ApiError> {
    let update = body(payload)?;
    Ok(Json(state.store.set_status(&id, update).await?))
}

/// PUT /fixture/:id/period
async fn period_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<PeriodRequest>, JsonRejection>,
) -> Result<Json<Fixture>, ApiError> {
    let req = body(payload)?;
    Ok(Json(state.store.set_period(&id, &req.period).await?))
}

/// PUT /fixture/:id/fixture-status
async fn fixture_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<FixtureStatus>, JsonRejection>,
) -> Result<Json<Fixture>, ApiError> {
    let status = body(payload)?;
    Ok(Json(state.store.set_fixture_status(&id, status).await?))
}
