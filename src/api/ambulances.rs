use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;

use super::AppState;
use crate::model::Ambulance;
use crate::updater::{ApiError, Reply};

pub async fn create_ambulance(
    State(state): State<AppState>,
    body: Result<Json<Ambulance>, JsonRejection>,
) -> Result<Reply<Ambulance>, ApiError> {
    let Json(ambulance) = body.map_err(ApiError::invalid_body)?;
    state.updater.create_ambulance(ambulance).await
}

pub async fn delete_ambulance(
    State(state): State<AppState>,
    Path(ambulance_id): Path<String>,
) -> Result<Reply<()>, ApiError> {
    state.updater.delete_ambulance(&ambulance_id).await
}
