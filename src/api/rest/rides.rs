use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::engine::coordinator;
use crate::error::AppError;
use crate::geo;
use crate::models::driver::GeoPoint;
use crate::models::ride::Ride;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides", post(create_ride).get(list_rides))
        .route("/rides/:id", get(get_ride))
        .route("/rides/:id/cancel", post(cancel_ride))
}

#[derive(Deserialize)]
pub struct CreateRideRequest {
    pub rider_id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
}

#[derive(Deserialize)]
pub struct ListRidesQuery {
    pub rider_id: Option<Uuid>,
}

async fn create_ride(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRideRequest>,
) -> Result<Json<Ride>, AppError> {
    if !geo::is_valid_point(&payload.pickup) {
        return Err(AppError::BadRequest(
            "pickup coordinate is out of range".to_string(),
        ));
    }

    if !geo::is_valid_point(&payload.dropoff) {
        return Err(AppError::BadRequest(
            "dropoff coordinate is out of range".to_string(),
        ));
    }

    let ride = coordinator::create_ride(
        &state,
        payload.rider_id,
        Some(payload.pickup),
        Some(payload.dropoff),
    )
    .await?;

    Ok(Json(ride))
}

async fn get_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let ride = state
        .rides
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("ride {} not found", id)))?;

    Ok(Json(ride.value().clone()))
}

async fn list_rides(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRidesQuery>,
) -> Json<Vec<Ride>> {
    let mut rides: Vec<Ride> = state
        .rides
        .iter()
        .filter(|entry| {
            query
                .rider_id
                .map(|rider_id| entry.value().rider_id == rider_id)
                .unwrap_or(true)
        })
        .map(|entry| entry.value().clone())
        .collect();

    rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(rides)
}

async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    coordinator::cancel_ride(&state, id).await?;
    Ok(Json(json!({ "message": "Ride cancelled" })))
}
