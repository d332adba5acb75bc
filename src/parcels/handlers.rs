use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

use super::dto::{
    CreateParcelRequest, ListQuery, Page, ParcelResponse, StatusFilterQuery, TrackingQuery,
    UpdateParcelRequest,
};
use super::services;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/parcels", get(list_parcels))
        .route("/parcels/filter", get(list_parcels_by_status))
        .route("/parcels/tracking", get(get_by_tracking_number))
        .route("/parcels/:id", get(get_parcel))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/parcels", post(create_parcel))
        .route("/parcels/:id", put(update_parcel))
        .route("/parcels/:id", delete(delete_parcel))
        .route("/parcels/:id/deliver", post(confirm_delivery))
}

#[instrument(skip(state, payload))]
async fn create_parcel(
    State(state): State<AppState>,
    Json(payload): Json<CreateParcelRequest>,
) -> Result<(StatusCode, Json<ParcelResponse>), AppError> {
    info!(recipient = ?payload.recipient_name, "received request to create parcel");
    let parcel = services::create_parcel(&state.db, payload).await?;
    Ok((StatusCode::CREATED, Json(parcel.into())))
}

#[instrument(skip(state))]
async fn list_parcels(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Page<ParcelResponse>>, AppError> {
    let page = services::list_parcels(&state.db, q.page, q.size, &q.sort_by, &q.sort_dir).await?;
    Ok(Json(page.map(ParcelResponse::from)))
}

#[instrument(skip(state))]
async fn list_parcels_by_status(
    State(state): State<AppState>,
    Query(q): Query<StatusFilterQuery>,
) -> Result<Json<Page<ParcelResponse>>, AppError> {
    let page = services::list_parcels_by_status(&state.db, &q.status, q.page, q.size).await?;
    Ok(Json(page.map(ParcelResponse::from)))
}

#[instrument(skip(state))]
async fn get_parcel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ParcelResponse>, AppError> {
    let parcel = services::get_parcel(&state.db, id).await?;
    Ok(Json(parcel.into()))
}

#[instrument(skip(state))]
async fn get_by_tracking_number(
    State(state): State<AppState>,
    Query(q): Query<TrackingQuery>,
) -> Result<Json<ParcelResponse>, AppError> {
    info!(tracking_number = %q.number, "received tracking request");
    let parcel = services::get_by_tracking_number(&state.db, &q.number).await?;
    Ok(Json(parcel.into()))
}

#[instrument(skip(state, payload))]
async fn update_parcel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateParcelRequest>,
) -> Result<Json<ParcelResponse>, AppError> {
    let parcel = services::update_parcel(&state.db, id, payload).await?;
    Ok(Json(parcel.into()))
}

#[instrument(skip(state))]
async fn delete_parcel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete_parcel(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
async fn confirm_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ParcelResponse>, AppError> {
    let parcel = services::confirm_delivery(&state.db, id).await?;
    Ok(Json(parcel.into()))
}
