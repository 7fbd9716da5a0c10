use crate::model::ModelError;
use geo::Geometry;
use geozero::{wkb::Wkb, CoordDimensions, ToGeo, ToWkb};

/// encode a geometry as WKB bytes for a geometry column
pub fn encode(geometry: &Geometry<f64>) -> Result<Vec<u8>, ModelError> {
    geometry
        .to_wkb(CoordDimensions::xy())
        .map_err(|e| ModelError::InvalidGeometry(format!("failed to encode geometry as WKB: {e}")))
}

/// decode WKB bytes read back from a geometry column
pub fn decode(bytes: Vec<u8>) -> Result<Geometry<f64>, ModelError> {
    Wkb(bytes)
        .to_geo()
        .map_err(|e| ModelError::InvalidGeometry(format!("unable to parse bytes as WKB: {e}")))
}
