use geo::Point;
use serde::{Deserialize, Serialize};

/// a transit stop served raw by the query layer, independent of isochrones.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransitStop {
    pub id: i64,
    pub gtfs_stop_id: String,
    pub stop_name: String,
    pub lat: f64,
    pub lng: f64,
    /// subway, bus, rail or ferry
    pub stop_type: String,
    pub agency: String,
}

impl TransitStop {
    pub fn point(&self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }
}
