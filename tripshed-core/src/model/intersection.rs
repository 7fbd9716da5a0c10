use geo::Point;
use serde::{Deserialize, Serialize};

/// a street intersection origin. rows are created once at ingest and never
/// mutated afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Intersection {
    pub id: i64,
    /// node id in the upstream street network extract
    pub osm_node_id: i64,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    /// region tag used for batch prioritisation
    pub borough: String,
    /// deterministic quarter assignment (id % 4) for subsampled viewports
    pub sample_group: i64,
}

impl Intersection {
    pub fn point(&self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }
}
