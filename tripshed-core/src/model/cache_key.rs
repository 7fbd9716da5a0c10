use super::{DayType, ModelError, TravelMode};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// the non-origin dimensions of a computation request. a band row is
/// identified by (origin id, cache key, cutoff); a batch status row by
/// (origin id, cache key).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub mode: TravelMode,
    pub departure: NaiveTime,
    pub day_type: DayType,
}

impl CacheKey {
    pub fn new(mode: TravelMode, departure: NaiveTime, day_type: DayType) -> CacheKey {
        CacheKey {
            mode,
            departure,
            day_type,
        }
    }

    /// parses a key from its API string dimensions, e.g.
    /// ("transit", "10:00:00", "weekday")
    pub fn parse(mode: &str, departure: &str, day_type: &str) -> Result<CacheKey, ModelError> {
        let mode = mode.parse::<TravelMode>()?;
        let departure = NaiveTime::parse_from_str(departure, "%H:%M:%S")
            .map_err(|_| ModelError::InvalidDepartureTime(departure.to_string()))?;
        let day_type = day_type.parse::<DayType>()?;
        Ok(CacheKey::new(mode, departure, day_type))
    }

    /// departure time serialized the way the band and status tables store it
    pub fn departure_string(&self) -> String {
        self.departure.format("%H:%M:%S").to_string()
    }

    /// the same key under a different travel mode
    pub fn with_mode(&self, mode: TravelMode) -> CacheKey {
        CacheKey { mode, ..*self }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}/{}",
            self.mode,
            self.departure_string(),
            self.day_type
        )
    }
}
