use super::QueryError;
use crate::store::Viewport;
use std::collections::HashMap;
use tripshed_core::model::CacheKey;

/// query parameters as a thin HTTP wrapper hands them over
pub type Params = HashMap<String, String>;

pub fn require_f64(params: &Params, name: &str) -> Result<f64, QueryError> {
    let raw = params
        .get(name)
        .ok_or_else(|| QueryError::BadRequest(format!("missing required parameter '{name}'")))?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| QueryError::BadRequest(format!("parameter '{name}' must be numeric, found '{raw}'")))
}

pub fn optional_f64(params: &Params, name: &str) -> Result<Option<f64>, QueryError> {
    match params.get(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<f64>().map(Some).map_err(|_| {
            QueryError::BadRequest(format!("parameter '{name}' must be numeric, found '{raw}'"))
        }),
    }
}

pub fn optional_i64(params: &Params, name: &str) -> Result<Option<i64>, QueryError> {
    match params.get(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<i64>().map(Some).map_err(|_| {
            QueryError::BadRequest(format!("parameter '{name}' must be an integer, found '{raw}'"))
        }),
    }
}

pub fn limit(params: &Params, default: u32) -> Result<u32, QueryError> {
    match params.get("limit") {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
            QueryError::BadRequest(format!("parameter 'limit' must be a count, found '{raw}'"))
        }),
    }
}

/// mode/time/dayType with the serving defaults: transit at 10:00:00 on a
/// weekday
pub fn cache_key(params: &Params) -> Result<CacheKey, QueryError> {
    let mode = params.get("mode").map(String::as_str).unwrap_or("transit");
    let time = params.get("time").map(String::as_str).unwrap_or("10:00:00");
    let day_type = params
        .get("dayType")
        .map(String::as_str)
        .unwrap_or("weekday");
    CacheKey::parse(mode, time, day_type).map_err(|e| QueryError::BadRequest(e.to_string()))
}

pub fn viewport(params: &Params) -> Result<Viewport, QueryError> {
    Ok(Viewport {
        min_lat: require_f64(params, "minLat")?,
        max_lat: require_f64(params, "maxLat")?,
        min_lng: require_f64(params, "minLng")?,
        max_lng: require_f64(params, "maxLng")?,
    })
}
