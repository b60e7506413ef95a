use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::engine::coordinator;
use crate::error::AppError;
use crate::geo;
use crate::models::driver::{Driver, GeoPoint};
use crate::models::ride::Ride;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/location", patch(update_driver_location))
        .route("/drivers/:id/requests", get(list_ride_requests))
        .route("/drivers/:id/rides/:ride_id/accept", post(accept_ride))
        .route("/drivers/:id/rides/:ride_id/reject", post(reject_ride))
        .route("/drivers/:id/rides/:ride_id/complete", post(complete_ride))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub user_id: Uuid,
    pub name: String,
    pub vehicle_model: String,
    pub registration_number: String,
    pub color: String,
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if let Some(location) = &payload.location {
        if !geo::is_valid_point(location) {
            return Err(AppError::BadRequest(
                "location coordinate is out of range".to_string(),
            ));
        }
    }

    let duplicate = state
        .drivers
        .iter()
        .any(|entry| entry.value().user_id == payload.user_id);
    if duplicate {
        return Err(AppError::Conflict(format!(
            "driver already exists for user {}",
            payload.user_id
        )));
    }

    let driver = Driver::new(
        payload.user_id,
        payload.name,
        payload.vehicle_model,
        payload.registration_number,
        payload.color,
        payload.location,
    );

    state.drivers.insert(driver.id, driver.clone());
    state.metrics.drivers_available.inc();
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    let drivers = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(drivers)
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    let driver = state
        .drivers
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))?;

    Ok(Json(driver.value().clone()))
}

// Location is the only mutable driver field here; availability flips
// only inside accept/complete.
async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    if !geo::is_valid_point(&payload.location) {
        return Err(AppError::BadRequest(
            "location coordinate is out of range".to_string(),
        ));
    }

    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))?;

    driver.location = Some(payload.location);
    driver.updated_at = Utc::now();

    Ok(Json(driver.clone()))
}

async fn list_ride_requests(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Ride>>, AppError> {
    let pending: Vec<Uuid> = {
        let driver = state
            .drivers
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))?;
        driver.pending_requests.iter().copied().collect()
    };

    let rides = pending
        .iter()
        .filter_map(|ride_id| state.rides.get(ride_id).map(|entry| entry.value().clone()))
        .collect();

    Ok(Json(rides))
}

async fn accept_ride(
    State(state): State<Arc<AppState>>,
    Path((id, ride_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    coordinator::accept_ride(&state, ride_id, id).await?;
    Ok(Json(json!({ "message": "Ride accepted" })))
}

async fn reject_ride(
    State(state): State<Arc<AppState>>,
    Path((id, ride_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    coordinator::reject_ride(&state, ride_id, id).await?;
    Ok(Json(json!({ "message": "Ride rejected" })))
}

async fn complete_ride(
    State(state): State<Arc<AppState>>,
    Path((id, ride_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    coordinator::complete_ride(&state, ride_id, id).await?;
    Ok(Json(json!({ "message": "Ride completed" })))
}
