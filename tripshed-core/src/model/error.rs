#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("unknown travel mode '{0}', expected one of: transit, transit_bike, bike, walk")]
    InvalidMode(String),
    #[error("unknown day type '{0}', expected one of: weekday, saturday, sunday")]
    InvalidDayType(String),
    #[error("invalid departure time '{0}', expected HH:MM:SS")]
    InvalidDepartureTime(String),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}
