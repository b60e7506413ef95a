use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::MatchPolicy;
use crate::models::driver::Driver;
use crate::models::ride::Ride;
use crate::notify::Notifier;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub rides: DashMap<Uuid, Ride>,
    pub drivers: DashMap<Uuid, Driver>,
    ride_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    pub notifier: Notifier,
    pub max_radius_km: f64,
    pub match_policy: MatchPolicy,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(max_radius_km: f64, match_policy: MatchPolicy, event_buffer_size: usize) -> Self {
        Self {
            rides: DashMap::new(),
            drivers: DashMap::new(),
            ride_locks: DashMap::new(),
            notifier: Notifier::new(event_buffer_size),
            max_radius_km,
            match_policy,
            metrics: Metrics::new(),
        }
    }

    /// Per-ride mutex serializing every dispatch operation (and match
    /// pass) touching that ride. First committer wins.
    pub fn ride_lock(&self, ride_id: Uuid) -> Arc<Mutex<()>> {
        self.ride_locks
            .entry(ride_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
