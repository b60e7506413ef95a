use std::env;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Offer the ride to every eligible driver within radius.
    Broadcast,
    /// Offer the ride only to the nearest driver with no unresolved offer.
    SingleBest,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "broadcast" => Ok(MatchPolicy::Broadcast),
            "single_best" => Ok(MatchPolicy::SingleBest),
            other => Err(format!("unknown match policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub max_radius_km: f64,
    pub match_policy: MatchPolicy,
    pub event_buffer_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            max_radius_km: parse_or_default("MAX_RADIUS_KM", 10.0)?,
            match_policy: parse_or_default("MATCH_POLICY", MatchPolicy::Broadcast)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
