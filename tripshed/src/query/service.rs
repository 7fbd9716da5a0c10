use super::params::{self, Params};
use super::QueryError;
use crate::store::CacheStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tripshed_core::model::{BandSet, TravelMode};
use tripshed_core::util::geo_ops;

const DEFAULT_VIEWPORT_LIMIT: u32 = 500;
const DEFAULT_STOPS_LIMIT: u32 = 1000;
const DEFAULT_NEARBY_RADIUS_M: f64 = 500.0;

/// cache-only read surface. parses string-keyed query parameters, calls into
/// the store, and assembles response values; never computes an isochrone.
pub struct QueryService {
    store: Arc<CacheStore>,
}

impl QueryService {
    pub fn new(store: Arc<CacheStore>) -> QueryService {
        QueryService { store }
    }

    /// nearest cached origin for a map click. `mode=compare` answers with
    /// both transit and bike band sets from one origin.
    pub fn click(&self, params: &Params) -> Result<Value, QueryError> {
        let lat = params::require_f64(params, "lat")?;
        let lng = params::require_f64(params, "lng")?;
        if params.get("mode").map(String::as_str) == Some("compare") {
            return self.click_compare(lat, lng, params);
        }
        let key = params::cache_key(params)?;
        let (intersection, bands) = self
            .store
            .nearest_with_isochrone(lat, lng, &key)?
            .ok_or(QueryError::NotFound)?;
        Ok(json!({
            "intersection": intersection,
            "isochrone": bands_payload(&bands),
            "source": "cache",
        }))
    }

    fn click_compare(&self, lat: f64, lng: f64, params: &Params) -> Result<Value, QueryError> {
        // time dimensions parse as usual; the mode dimension is the pair
        let time_key = params::cache_key(&{
            let mut without_mode = params.clone();
            without_mode.remove("mode");
            without_mode
        })?;
        let comparison = self
            .store
            .nearest_with_both_modes(lat, lng, time_key.departure, time_key.day_type)?
            .ok_or(QueryError::NotFound)?;
        Ok(json!({
            "intersection": comparison.intersection,
            "isochrone": {
                "transit": bands_payload(&comparison.transit),
                "bike": bands_payload(&comparison.bike),
            },
            "source": "cache",
        }))
    }

    /// bands for a specific origin, without the intersection wrapping
    pub fn isochrone_for_origin(
        &self,
        origin_id: i64,
        params: &Params,
    ) -> Result<Value, QueryError> {
        let key = params::cache_key(params)?;
        let bands = self
            .store
            .cached_isochrone(origin_id, &key)?
            .ok_or(QueryError::NotFound)?;
        Ok(json!({
            "isochrone": bands_payload(&bands),
            "source": "cache",
        }))
    }

    pub fn intersections_viewport(&self, params: &Params) -> Result<Value, QueryError> {
        let viewport = params::viewport(params)?;
        let limit = params::limit(params, DEFAULT_VIEWPORT_LIMIT)?;
        let key = params::cache_key(params)?;
        let sample_group = params::optional_i64(params, "sampleGroup")?;
        let rows = self
            .store
            .intersections_in_viewport(&viewport, limit, &key, sample_group)?;
        let count = rows.len();
        Ok(json!({
            "intersections": rows,
            "count": count,
        }))
    }

    pub fn transit_stops_viewport(&self, params: &Params) -> Result<Value, QueryError> {
        let viewport = params::viewport(params)?;
        let limit = params::limit(params, DEFAULT_STOPS_LIMIT)?;
        let stops = self.store.transit_stops_in_viewport(&viewport, limit)?;
        let count = stops.len();
        Ok(json!({
            "stops": stops,
            "count": count,
        }))
    }

    pub fn transit_stops_nearby(&self, params: &Params) -> Result<Value, QueryError> {
        let lat = params::require_f64(params, "lat")?;
        let lng = params::require_f64(params, "lng")?;
        let radius_m =
            params::optional_f64(params, "radius")?.unwrap_or(DEFAULT_NEARBY_RADIUS_M);
        let nearby = self.store.transit_stops_near(lat, lng, radius_m)?;
        let stops = nearby
            .into_iter()
            .map(|(stop, distance_m)| {
                let mut value = serde_json::to_value(&stop)
                    .map_err(|e| QueryError::Internal(e.to_string()))?;
                if let Value::Object(fields) = &mut value {
                    fields.insert(String::from("distance_m"), json!(distance_m.round()));
                }
                Ok(value)
            })
            .collect::<Result<Vec<_>, QueryError>>()?;
        let count = stops.len();
        Ok(json!({
            "stops": stops,
            "count": count,
        }))
    }

    pub fn modes(&self) -> Value {
        let mut modes: Vec<Value> = TravelMode::ALL
            .iter()
            .map(|mode| json!({ "id": mode.as_str(), "label": mode.label() }))
            .collect();
        modes.push(json!({ "id": "compare", "label": "Transit vs Bike" }));
        json!({ "modes": modes })
    }

    pub fn stats(&self, params: &Params) -> Result<Value, QueryError> {
        let key = params::cache_key(params)?;
        let stats = self.store.stats(&key)?;
        Ok(json!(stats))
    }

    pub fn health(&self) -> Value {
        match self.store.origin_count() {
            Ok(count) => json!({ "status": "ok", "intersections": count }),
            Err(e) => json!({ "status": "error", "error": e.to_string() }),
        }
    }
}

/// GeoJSON polygons keyed `isochrone_15m` .. `isochrone_180m`
fn bands_payload(bands: &BandSet) -> Value {
    let mut payload = serde_json::Map::new();
    for (cutoff, geometry) in bands.iter() {
        payload.insert(
            format!("isochrone_{cutoff}m"),
            json!(geo_ops::to_geojson(geometry)),
        );
    }
    Value::Object(payload)
}
