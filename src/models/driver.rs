use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub vehicle_model: String,
    pub registration_number: String,
    pub color: String,
    pub location: Option<GeoPoint>,
    pub available: bool,
    pub pending_requests: HashSet<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(
        user_id: Uuid,
        name: String,
        vehicle_model: String,
        registration_number: String,
        color: String,
        location: Option<GeoPoint>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name,
            vehicle_model,
            registration_number,
            color,
            location,
            available: true,
            pending_requests: HashSet::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
