use crate::model::ModelError;
use geo::{BooleanOps, CoordsIter, Distance, Geometry, Haversine, MultiPolygon, Point, Simplify};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// views a polygonal geometry as a multipolygon. returns None for
/// non-areal geometry types.
pub fn as_multi_polygon(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        _ => None,
    }
}

/// clips a reachable-area geometry to the land boundary.
///
/// the result is the polygonal intersection of the input with `land`. when
/// that intersection is empty, or the boolean operation cannot repair the
/// input to a valid shape, the input is returned verbatim so a band is never
/// silently dropped at a coastline.
pub fn clip_to_land(geometry: &Geometry<f64>, land: &MultiPolygon<f64>) -> Geometry<f64> {
    let Some(mp) = as_multi_polygon(geometry) else {
        return geometry.clone();
    };
    match catch_unwind(AssertUnwindSafe(|| mp.intersection(land))) {
        Ok(clipped) if clipped.coords_count() > 0 => Geometry::MultiPolygon(clipped),
        Ok(_) => geometry.clone(),
        Err(_) => {
            log::warn!("land intersection failed on an irreparable geometry, keeping unclipped shape");
            geometry.clone()
        }
    }
}

/// reduces vertex count with a Ramer-Douglas-Peucker pass. epsilon is in
/// degrees of longitude/latitude; 0.0001 is roughly 11 m in this region.
pub fn simplify_geometry(geometry: &Geometry<f64>, epsilon: f64) -> Geometry<f64> {
    match geometry {
        Geometry::Polygon(p) => Geometry::Polygon(p.simplify(epsilon)),
        Geometry::MultiPolygon(mp) => Geometry::MultiPolygon(mp.simplify(epsilon)),
        Geometry::LineString(ls) => Geometry::LineString(ls.simplify(epsilon)),
        other => other.clone(),
    }
}

/// great-circle distance between two lng/lat points, in meters
pub fn distance_meters(a: Point<f64>, b: Point<f64>) -> f64 {
    Haversine.distance(a, b)
}

/// serializes a geometry to a GeoJSON geometry object
pub fn to_geojson(geometry: &Geometry<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(geometry))
}

/// reads a GeoJSON geometry value into geo-types
pub fn from_geojson(value: geojson::Value) -> Result<Geometry<f64>, ModelError> {
    Geometry::<f64>::try_from(value).map_err(|e| ModelError::InvalidGeometry(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use geo::{polygon, Area, BoundingRect};

    fn square(min: f64, max: f64) -> geo::Polygon<f64> {
        polygon![
            (x: min, y: min),
            (x: max, y: min),
            (x: max, y: max),
            (x: min, y: max),
            (x: min, y: min),
        ]
    }

    #[test]
    fn test_clip_overlapping_polygon() {
        let land = MultiPolygon::new(vec![square(0.0, 10.0)]);
        let input = Geometry::Polygon(square(5.0, 15.0));
        let clipped = clip_to_land(&input, &land);

        let bounds = clipped.bounding_rect().unwrap();
        assert_eq!(bounds.min().x, 5.0);
        assert_eq!(bounds.min().y, 5.0);
        assert_eq!(bounds.max().x, 10.0);
        assert_eq!(bounds.max().y, 10.0);

        let area = match &clipped {
            Geometry::MultiPolygon(mp) => mp.unsigned_area(),
            other => panic!("expected clipped multipolygon, found {other:?}"),
        };
        assert!((area - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_clip_disjoint_polygon_falls_back_to_input() {
        let land = MultiPolygon::new(vec![square(0.0, 10.0)]);
        let input = Geometry::Polygon(square(20.0, 30.0));
        let clipped = clip_to_land(&input, &land);
        assert_eq!(clipped, input);
    }

    #[test]
    fn test_clip_non_polygonal_passthrough() {
        let land = MultiPolygon::new(vec![square(0.0, 10.0)]);
        let input = Geometry::Point(Point::new(5.0, 5.0));
        assert_eq!(clip_to_land(&input, &land), input);
    }

    #[test]
    fn test_simplify_drops_collinear_vertices() {
        let noisy = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 0.5, y: 0.00001),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]);
        let simplified = simplify_geometry(&noisy, 0.0001);
        assert!(simplified.coords_count() < noisy.coords_count());
    }

    #[test]
    fn test_distance_meters_nyc_block() {
        // one degree of latitude is roughly 111 km
        let a = Point::new(-73.99, 40.75);
        let b = Point::new(-73.99, 40.76);
        let d = distance_meters(a, b);
        assert!((d - 1_111.0).abs() < 10.0, "unexpected distance {d}");
    }

    #[test]
    fn test_geojson_round_trip() {
        let geometry = Geometry::Polygon(square(0.0, 1.0));
        let encoded = to_geojson(&geometry);
        let decoded = from_geojson(encoded.value).unwrap();
        assert_eq!(decoded, geometry);
    }
}
