use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::engine::matcher;
use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::models::ride::{Ride, RideStatus};
use crate::notify::Notifier;
use crate::state::AppState;

fn ride_not_found(ride_id: Uuid) -> AppError {
    AppError::NotFound(format!("ride {ride_id} not found"))
}

fn driver_not_found(driver_id: Uuid) -> AppError {
    AppError::NotFound(format!("driver {driver_id} not found"))
}

/// Create a ride for `rider_id` and run the matcher before returning.
///
/// A rider keeps at most one pending ride: every prior pending ride of
/// the same rider is cancelled first, including the cascade that clears
/// its outstanding driver offers.
pub async fn create_ride(
    state: &AppState,
    rider_id: Uuid,
    pickup: Option<GeoPoint>,
    dropoff: Option<GeoPoint>,
) -> Result<Ride, AppError> {
    let prior_pending: Vec<Uuid> = state
        .rides
        .iter()
        .filter(|entry| {
            entry.value().rider_id == rider_id && entry.value().status == RideStatus::Pending
        })
        .map(|entry| entry.value().id)
        .collect();

    for prior_id in prior_pending {
        match cancel_ride(state, prior_id).await {
            Ok(()) => {
                info!(ride_id = %prior_id, rider_id = %rider_id, "cancelled prior pending ride");
            }
            // lost a race to another transition on the prior ride
            Err(AppError::InvalidTransition(_)) | Err(AppError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
    }

    let ride = Ride::new(rider_id, pickup, dropoff);
    let ride_id = ride.id;

    let lock = state.ride_lock(ride_id);
    let _guard = lock.lock().await;

    state.rides.insert(ride_id, ride);
    state
        .metrics
        .dispatch_operations_total
        .with_label_values(&["create", "success"])
        .inc();
    info!(ride_id = %ride_id, rider_id = %rider_id, "ride created");

    matcher::match_drivers(state, ride_id);

    state
        .rides
        .get(&ride_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| ride_not_found(ride_id))
}

/// Cancel a pending ride and clear every outstanding driver offer.
pub async fn cancel_ride(state: &AppState, ride_id: Uuid) -> Result<(), AppError> {
    let lock = state.ride_lock(ride_id);
    let _guard = lock.lock().await;

    let candidates: Vec<Uuid> = {
        let mut ride = state.rides.get_mut(&ride_id).ok_or_else(|| ride_not_found(ride_id))?;
        if !ride.can_cancel() {
            state
                .metrics
                .dispatch_operations_total
                .with_label_values(&["cancel", "rejected"])
                .inc();
            return Err(AppError::InvalidTransition(format!(
                "ride {ride_id} cannot be cancelled"
            )));
        }

        let candidates = ride.candidates.drain().collect();
        ride.status = RideStatus::Cancelled;
        ride.updated_at = Utc::now();
        candidates
    };

    for driver_id in candidates {
        if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
            driver.pending_requests.remove(&ride_id);
            driver.updated_at = Utc::now();
        }
    }

    state
        .metrics
        .dispatch_operations_total
        .with_label_values(&["cancel", "success"])
        .inc();
    info!(ride_id = %ride_id, "ride cancelled");
    Ok(())
}

/// Bind the ride to the first accepting driver.
///
/// Serialized by the ride lock: of N concurrent accepts exactly one
/// passes the `driver_id.is_none()` check, every later caller observes
/// the assignment and fails with `RideNotAcceptable`.
pub async fn accept_ride(state: &AppState, ride_id: Uuid, driver_id: Uuid) -> Result<(), AppError> {
    let lock = state.ride_lock(ride_id);
    let _guard = lock.lock().await;

    {
        let ride = state.rides.get(&ride_id).ok_or_else(|| ride_not_found(ride_id))?;
        if ride.driver_id.is_some() || ride.status != RideStatus::Pending {
            state
                .metrics
                .dispatch_operations_total
                .with_label_values(&["accept", "rejected"])
                .inc();
            return Err(AppError::RideNotAcceptable(format!(
                "ride {ride_id} is no longer available"
            )));
        }
    }

    // Check-and-flip availability under a single entry guard: a driver
    // racing to accept two rides at once wins at most one. The flip
    // happens before the ride is assigned, so the transient state is an
    // unavailable driver, which the matcher simply skips.
    let other_offers: Vec<Uuid> = {
        let mut driver = state
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| driver_not_found(driver_id))?;
        if !driver.available {
            state
                .metrics
                .dispatch_operations_total
                .with_label_values(&["accept", "rejected"])
                .inc();
            return Err(AppError::RideNotAcceptable(format!(
                "driver {driver_id} is not available"
            )));
        }
        driver.available = false;
        driver.updated_at = Utc::now();
        driver.pending_requests.drain().collect()
    };

    // invalidate every other driver's offer for this ride
    let candidates: Vec<Uuid> = {
        let mut ride = state.rides.get_mut(&ride_id).ok_or_else(|| ride_not_found(ride_id))?;
        let candidates = ride.candidates.drain().collect();
        ride.driver_id = Some(driver_id);
        ride.status = RideStatus::InProgress;
        ride.updated_at = Utc::now();
        candidates
    };

    for candidate_id in candidates {
        if candidate_id == driver_id {
            continue;
        }
        if let Some(mut candidate) = state.drivers.get_mut(&candidate_id) {
            candidate.pending_requests.remove(&ride_id);
            candidate.updated_at = Utc::now();
        }
    }

    for other_ride_id in other_offers {
        if other_ride_id == ride_id {
            continue;
        }
        if let Some(mut other) = state.rides.get_mut(&other_ride_id) {
            other.candidates.remove(&driver_id);
            other.updated_at = Utc::now();
        }
    }

    state.metrics.drivers_available.dec();
    state
        .metrics
        .dispatch_operations_total
        .with_label_values(&["accept", "success"])
        .inc();

    state
        .notifier
        .push(&Notifier::driver_channel(driver_id), "Ride accepted");

    info!(ride_id = %ride_id, driver_id = %driver_id, "ride accepted");
    Ok(())
}

/// Finish an in-progress ride and release its driver.
pub async fn complete_ride(
    state: &AppState,
    ride_id: Uuid,
    driver_id: Uuid,
) -> Result<(), AppError> {
    let lock = state.ride_lock(ride_id);
    let _guard = lock.lock().await;

    {
        let ride = state.rides.get(&ride_id).ok_or_else(|| ride_not_found(ride_id))?;
        if ride.driver_id != Some(driver_id) || ride.status != RideStatus::InProgress {
            state
                .metrics
                .dispatch_operations_total
                .with_label_values(&["complete", "rejected"])
                .inc();
            return Err(AppError::InvalidTransition(format!(
                "ride {ride_id} is not in progress for driver {driver_id}"
            )));
        }
    }

    if let Some(mut ride) = state.rides.get_mut(&ride_id) {
        ride.status = RideStatus::Completed;
        ride.updated_at = Utc::now();
    }

    {
        let mut driver = state
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| driver_not_found(driver_id))?;
        driver.available = true;
        driver.updated_at = Utc::now();
    }

    state.metrics.drivers_available.inc();
    state
        .metrics
        .dispatch_operations_total
        .with_label_values(&["complete", "success"])
        .inc();
    info!(ride_id = %ride_id, driver_id = %driver_id, "ride completed");
    Ok(())
}

/// Record a driver's rejection and re-run the matcher for replacements.
///
/// Idempotent: a repeat rejection is a no-op, the driver is already out
/// of consideration and the rejected set never shrinks.
pub async fn reject_ride(state: &AppState, ride_id: Uuid, driver_id: Uuid) -> Result<(), AppError> {
    let lock = state.ride_lock(ride_id);
    let _guard = lock.lock().await;

    let newly_rejected = {
        let mut ride = state.rides.get_mut(&ride_id).ok_or_else(|| ride_not_found(ride_id))?;
        let newly_rejected = ride.rejected.insert(driver_id);
        ride.candidates.remove(&driver_id);
        if newly_rejected {
            ride.updated_at = Utc::now();
        }
        newly_rejected
    };

    if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
        if driver.pending_requests.remove(&ride_id) {
            driver.updated_at = Utc::now();
        }
    }

    if newly_rejected {
        let replacements = matcher::match_drivers(state, ride_id);
        info!(
            ride_id = %ride_id,
            driver_id = %driver_id,
            replacements = replacements.len(),
            "ride rejected, re-matched"
        );
    }

    state
        .metrics
        .dispatch_operations_total
        .with_label_values(&["reject", "success"])
        .inc();
    Ok(())
}
