//! REST handlers for banner rotation and operational endpoints.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use rotator_core::types::{BannerId, SlotId, SocialGroupId};
use rotator_core::RotatorError;
use rotator_engine::{AssociationManager, SelectionEngine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub selection: Arc<SelectionEngine>,
    pub associations: Arc<AssociationManager>,
    pub node_id: String,
    pub start_time: Instant,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[derive(Debug, Deserialize)]
pub struct BannerSlotForm {
    pub banner_id: BannerId,
    pub slot_id: SlotId,
}

#[derive(Debug, Deserialize)]
pub struct BannerForSlotQuery {
    pub slot_id: SlotId,
    pub soc_dem_id: SocialGroupId,
}

#[derive(Debug, Deserialize)]
pub struct ClickForm {
    pub banner_id: BannerId,
    pub slot_id: SlotId,
    pub soc_dem_id: SocialGroupId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BannerForSlotResponse {
    pub banner_id: BannerId,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

fn validate_ids(ids: &[(&'static str, i64)]) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    for (name, id) in ids {
        if *id <= 0 {
            metrics::counter!("api.validation_errors").increment(1);
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "invalid_request".to_string(),
                    message: format!("'{name}' must be a positive id"),
                }),
            ));
        }
    }
    Ok(())
}

/// Map a domain error to a status code and body. Not-found and conflict
/// kinds carry their message; failures on our side get a generic one.
fn error_response(err: RotatorError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        RotatorError::AlreadyAssociated { .. } => StatusCode::CONFLICT,
        RotatorError::NoCandidates { .. } | RotatorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %err, "Request failed");
        metrics::counter!("api.errors").increment(1);
        "Internal processing error".to_string()
    } else {
        warn!(error = %err, "Request rejected");
        err.to_string()
    };

    (
        status,
        Json(ErrorResponse {
            error: err.code().to_string(),
            message,
        }),
    )
}

/// POST /slot/banner/add: put a banner into rotation for a slot.
pub async fn add_banner_to_slot(
    State(state): State<AppState>,
    Json(form): Json<BannerSlotForm>,
) -> ApiResult<Empty> {
    validate_ids(&[("banner_id", form.banner_id), ("slot_id", form.slot_id)])?;
    state
        .associations
        .add_banner_to_slot(form.banner_id, form.slot_id)
        .await
        .map_err(error_response)?;
    Ok(Json(Empty::default()))
}

/// POST /slot/banner/remove: take a banner out of rotation.
pub async fn remove_banner_from_slot(
    State(state): State<AppState>,
    Json(form): Json<BannerSlotForm>,
) -> ApiResult<Empty> {
    validate_ids(&[("banner_id", form.banner_id), ("slot_id", form.slot_id)])?;
    state
        .associations
        .remove_banner_from_slot(form.banner_id, form.slot_id)
        .await
        .map_err(error_response)?;
    Ok(Json(Empty::default()))
}

/// GET /slot/banner?slot_id=&soc_dem_id=: next banner to show.
pub async fn banner_for_slot(
    State(state): State<AppState>,
    Query(query): Query<BannerForSlotQuery>,
) -> ApiResult<BannerForSlotResponse> {
    validate_ids(&[("slot_id", query.slot_id), ("soc_dem_id", query.soc_dem_id)])?;
    let banner_id = state
        .selection
        .choose_banner(query.slot_id, query.soc_dem_id)
        .await
        .map_err(error_response)?;
    Ok(Json(BannerForSlotResponse { banner_id }))
}

/// POST /slot/banner/click: record a click on a shown banner.
pub async fn click_banner(
    State(state): State<AppState>,
    Json(form): Json<ClickForm>,
) -> ApiResult<Empty> {
    validate_ids(&[
        ("banner_id", form.banner_id),
        ("slot_id", form.slot_id),
        ("soc_dem_id", form.soc_dem_id),
    ])?;
    state
        .associations
        .record_click(form.banner_id, form.slot_id, form.soc_dem_id)
        .await
        .map_err(error_response)?;
    Ok(Json(Empty::default()))
}

/// GET /health: Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready: Readiness probe.
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live: Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
