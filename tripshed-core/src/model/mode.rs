use super::ModelError;
use serde::{Deserialize, Serialize};

/// travel mode dimension of a cache key. each mode maps to a distinct
/// parameter vocabulary on the routing worker.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    Transit,
    TransitBike,
    Bike,
    Walk,
}

impl TravelMode {
    pub const ALL: [TravelMode; 4] = [
        TravelMode::Transit,
        TravelMode::TransitBike,
        TravelMode::Bike,
        TravelMode::Walk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Transit => "transit",
            TravelMode::TransitBike => "transit_bike",
            TravelMode::Bike => "bike",
            TravelMode::Walk => "walk",
        }
    }

    /// display name for mode listings
    pub fn label(&self) -> &'static str {
        match self {
            TravelMode::Transit => "Transit + Walk",
            TravelMode::TransitBike => "Transit + Bike",
            TravelMode::Bike => "Bike",
            TravelMode::Walk => "Walk",
        }
    }

    /// query parameters the routing worker expects for this mode
    pub fn worker_params(&self) -> Vec<(&'static str, &'static str)> {
        match self {
            TravelMode::Transit => vec![("modes", "TRANSIT,WALK")],
            TravelMode::TransitBike => vec![
                ("modes", "TRANSIT"),
                ("accessModes", "BIKE"),
                ("egressModes", "BIKE"),
            ],
            TravelMode::Bike => vec![("modes", "BIKE")],
            TravelMode::Walk => vec![("modes", "WALK")],
        }
    }
}

impl std::str::FromStr for TravelMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transit" => Ok(TravelMode::Transit),
            "transit_bike" | "transit-bike" | "transitbike" => Ok(TravelMode::TransitBike),
            "bike" => Ok(TravelMode::Bike),
            "walk" => Ok(TravelMode::Walk),
            _ => Err(ModelError::InvalidMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for TravelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_mode_round_trip() {
        for mode in TravelMode::ALL {
            let parsed = TravelMode::from_str(mode.as_str()).unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn test_transit_bike_worker_params() {
        let params = TravelMode::TransitBike.worker_params();
        assert_eq!(
            params,
            vec![
                ("modes", "TRANSIT"),
                ("accessModes", "BIKE"),
                ("egressModes", "BIKE"),
            ]
        );
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result = TravelMode::from_str("teleport");
        assert!(matches!(result, Err(ModelError::InvalidMode(_))));
    }
}
