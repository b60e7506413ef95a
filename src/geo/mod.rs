use std::collections::HashSet;

use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::models::driver::{Driver, GeoPoint};

const EARTH_RADIUS_KM: f64 = 6_371.0;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("invalid origin coordinate: lat={lat} lng={lng}")]
    InvalidOrigin { lat: f64, lng: f64 },
}

#[derive(Debug, Clone)]
pub struct DriverDistance {
    pub driver_id: Uuid,
    pub distance_km: f64,
}

pub fn is_valid_point(point: &GeoPoint) -> bool {
    point.lat.is_finite()
        && point.lng.is_finite()
        && point.lat.abs() <= 90.0
        && point.lng.abs() <= 180.0
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Spatial query over the driver table: every available driver with a
/// known location, not in `exclude`, within `radius_km` of `origin`.
/// Results are sorted by ascending distance.
pub fn find_within_radius(
    drivers: &DashMap<Uuid, Driver>,
    origin: &GeoPoint,
    radius_km: f64,
    exclude: &HashSet<Uuid>,
) -> Result<Vec<DriverDistance>, GeoError> {
    if !is_valid_point(origin) {
        return Err(GeoError::InvalidOrigin {
            lat: origin.lat,
            lng: origin.lng,
        });
    }

    let mut matches: Vec<DriverDistance> = drivers
        .iter()
        .filter_map(|entry| {
            let driver = entry.value();
            if !driver.available || exclude.contains(&driver.id) {
                return None;
            }

            let location = driver.location.as_ref()?;
            let distance_km = haversine_km(location, origin);

            (distance_km <= radius_km).then(|| DriverDistance {
                driver_id: driver.id,
                distance_km,
            })
        })
        .collect();

    matches.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    Ok(matches)
}
