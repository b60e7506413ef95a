use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RideStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: Option<GeoPoint>,
    pub dropoff: Option<GeoPoint>,
    pub status: RideStatus,
    /// Drivers currently holding an un-actioned offer for this ride.
    pub candidates: HashSet<Uuid>,
    /// Drivers who declined this ride; never offered it again.
    pub rejected: HashSet<Uuid>,
    pub eta: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    pub fn new(rider_id: Uuid, pickup: Option<GeoPoint>, dropoff: Option<GeoPoint>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            rider_id,
            driver_id: None,
            pickup,
            dropoff,
            status: RideStatus::Pending,
            candidates: HashSet::new(),
            rejected: HashSet::new(),
            eta: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_cancel(&self) -> bool {
        self.status == RideStatus::Pending
    }
}
