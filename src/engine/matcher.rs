use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::MatchPolicy;
use crate::geo;
use crate::geo::DriverDistance;
use crate::models::ride::RideStatus;
use crate::notify::Notifier;
use crate::state::AppState;

/// Offer `ride_id` to eligible drivers and return the drivers offered.
///
/// Callers must hold the ride's lock; the matcher itself takes none, so
/// it can run inside ride creation and inside the rejection path alike.
/// Re-invoking it is safe: offers are set-valued on both sides, and a
/// driver in the ride's rejected set is never offered again.
pub fn match_drivers(state: &AppState, ride_id: Uuid) -> Vec<Uuid> {
    let start = Instant::now();

    let (pickup, rejected) = {
        let Some(ride) = state.rides.get(&ride_id) else {
            return Vec::new();
        };
        if ride.status != RideStatus::Pending {
            return Vec::new();
        }
        let Some(pickup) = ride.pickup.clone() else {
            return Vec::new();
        };
        (pickup, ride.rejected.clone())
    };

    let candidates =
        match geo::find_within_radius(&state.drivers, &pickup, state.max_radius_km, &rejected) {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(ride_id = %ride_id, error = %err, "spatial query failed; matching with zero candidates");
                state
                    .metrics
                    .match_latency_seconds
                    .with_label_values(&["error"])
                    .observe(start.elapsed().as_secs_f64());
                return Vec::new();
            }
        };

    let offers: Vec<DriverDistance> = match state.match_policy {
        MatchPolicy::Broadcast => candidates,
        MatchPolicy::SingleBest => candidates
            .into_iter()
            .filter(|candidate| !has_unresolved_request(state, candidate.driver_id))
            .take(1)
            .collect(),
    };

    let mut matched = Vec::with_capacity(offers.len());
    for offer in &offers {
        let channel = {
            let Some(mut driver) = state.drivers.get_mut(&offer.driver_id) else {
                continue;
            };
            driver.pending_requests.insert(ride_id);
            driver.updated_at = Utc::now();
            Notifier::driver_channel(driver.id)
        };

        if let Some(mut ride) = state.rides.get_mut(&ride_id) {
            ride.candidates.insert(offer.driver_id);
            ride.updated_at = Utc::now();
        }

        state.notifier.push(&channel, "Ride request");
        state.metrics.ride_offers_total.inc();
        matched.push(offer.driver_id);
    }

    state
        .metrics
        .match_latency_seconds
        .with_label_values(&["success"])
        .observe(start.elapsed().as_secs_f64());

    info!(ride_id = %ride_id, offered = matched.len(), "match pass finished");
    matched
}

/// A driver is encumbered while any offered ride is still pending.
fn has_unresolved_request(state: &AppState, driver_id: Uuid) -> bool {
    let Some(driver) = state.drivers.get(&driver_id) else {
        return false;
    };

    driver.pending_requests.iter().any(|ride_id| {
        state
            .rides
            .get(ride_id)
            .map(|ride| ride.status == RideStatus::Pending)
            .unwrap_or(false)
    })
}
