use super::ModelError;
use serde::{Deserialize, Serialize};

/// service day class of a cache key. the routing graph's calendar repeats
/// weekly, so one representative date per class is sufficient (see the
/// service calendar configuration).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DayType {
    Weekday,
    Saturday,
    Sunday,
}

impl DayType {
    pub const ALL: [DayType; 3] = [DayType::Weekday, DayType::Saturday, DayType::Sunday];

    pub fn as_str(&self) -> &'static str {
        match self {
            DayType::Weekday => "weekday",
            DayType::Saturday => "saturday",
            DayType::Sunday => "sunday",
        }
    }
}

impl std::str::FromStr for DayType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekday" => Ok(DayType::Weekday),
            "saturday" => Ok(DayType::Saturday),
            "sunday" => Ok(DayType::Sunday),
            _ => Err(ModelError::InvalidDayType(s.to_string())),
        }
    }
}

impl std::fmt::Display for DayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_day_type_round_trip() {
        for day_type in DayType::ALL {
            assert_eq!(DayType::from_str(day_type.as_str()).unwrap(), day_type);
        }
    }

    #[test]
    fn test_unknown_day_type_rejected() {
        assert!(matches!(
            DayType::from_str("holiday"),
            Err(ModelError::InvalidDayType(_))
        ));
    }
}
