use super::{IsochroneQuery, RoutingError};
use chrono::{NaiveDate, NaiveTime};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tripshed_core::model::{BandSet, DayType};
use tripshed_core::util::geo_ops;

/// maps a day type onto a fixed calendar date inside the routing graph's
/// validity window, plus the deployment's UTC offset. the graph calendar
/// repeats weekly so one date per day class is enough.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServiceCalendar {
    pub weekday_date: NaiveDate,
    pub saturday_date: NaiveDate,
    pub sunday_date: NaiveDate,
    pub timezone_offset: String,
}

impl Default for ServiceCalendar {
    fn default() -> ServiceCalendar {
        ServiceCalendar {
            weekday_date: NaiveDate::from_ymd_opt(2024, 11, 13).unwrap(),
            saturday_date: NaiveDate::from_ymd_opt(2024, 11, 16).unwrap(),
            sunday_date: NaiveDate::from_ymd_opt(2024, 11, 17).unwrap(),
            timezone_offset: String::from("-05:00"),
        }
    }
}

impl ServiceCalendar {
    pub fn date_for(&self, day_type: DayType) -> NaiveDate {
        match day_type {
            DayType::Weekday => self.weekday_date,
            DayType::Saturday => self.saturday_date,
            DayType::Sunday => self.sunday_date,
        }
    }

    /// renders the worker's `time` parameter, e.g. `2024-11-13T10:00:00-05:00`
    pub fn departure_timestamp(&self, day_type: DayType, departure: NaiveTime) -> String {
        format!(
            "{}T{}{}",
            self.date_for(day_type).format("%Y-%m-%d"),
            departure.format("%H:%M:%S"),
            self.timezone_offset
        )
    }
}

/// one wire round-trip to a routing worker: request the given cutoffs,
/// parse the feature collection into bands. the multi-cutoff/fallback
/// algorithm lives above this seam in `RoutingClient`.
pub trait IsochroneTransport: Send + Sync {
    fn request_bands(
        &self,
        query: &IsochroneQuery,
        cutoffs: &[u32],
        worker_url: &str,
    ) -> Result<BandSet, RoutingError>;
}

/// production transport speaking the worker's traveltime isochrone protocol
pub struct HttpTransport {
    http: reqwest::blocking::Client,
    calendar: ServiceCalendar,
}

impl HttpTransport {
    pub fn new(timeout: Duration, calendar: ServiceCalendar) -> Result<HttpTransport, RoutingError> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| RoutingError::Http(e.to_string()))?;
        Ok(HttpTransport { http, calendar })
    }
}

impl IsochroneTransport for HttpTransport {
    fn request_bands(
        &self,
        query: &IsochroneQuery,
        cutoffs: &[u32],
        worker_url: &str,
    ) -> Result<BandSet, RoutingError> {
        let url = build_isochrone_url(worker_url, query, cutoffs, &self.calendar)?;
        log::debug!("GET {url}");
        let response = self
            .http
            .get(url.clone())
            .send()
            .map_err(|e| RoutingError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RoutingError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let collection: geojson::FeatureCollection = response
            .json()
            .map_err(|e| RoutingError::MalformedFeature(e.to_string()))?;
        bands_from_features(collection)
    }
}

pub(crate) fn build_isochrone_url(
    worker_url: &str,
    query: &IsochroneQuery,
    cutoffs: &[u32],
    calendar: &ServiceCalendar,
) -> Result<Url, RoutingError> {
    let base = format!(
        "{}/otp/traveltime/isochrone",
        worker_url.trim_end_matches('/')
    );
    let mut url = Url::parse(&base).map_err(|e| RoutingError::InvalidUrl {
        url: worker_url.to_string(),
        message: e.to_string(),
    })?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("batch", "true");
        pairs.append_pair("location", &format!("{},{}", query.lat, query.lng));
        pairs.append_pair(
            "time",
            &calendar.departure_timestamp(query.day_type, query.departure),
        );
        for cutoff in cutoffs {
            pairs.append_pair("cutoff", &format!("PT{cutoff}M"));
        }
        for (name, value) in query.mode.worker_params() {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

/// maps each feature onto a cutoff band by its `time` property, a decimal
/// string of seconds, integer-divided down to minutes
fn bands_from_features(collection: geojson::FeatureCollection) -> Result<BandSet, RoutingError> {
    if collection.features.is_empty() {
        return Err(RoutingError::EmptyFeatureCollection);
    }
    let mut bands = BandSet::new();
    for feature in collection.features {
        let time = feature
            .properties
            .as_ref()
            .and_then(|p| p.get("time"))
            .ok_or_else(|| {
                RoutingError::MalformedFeature("feature is missing the 'time' property".to_string())
            })?;
        let seconds = match time {
            serde_json::Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
                RoutingError::MalformedFeature(format!("non-numeric 'time' property '{s}'"))
            })?,
            serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| {
                RoutingError::MalformedFeature(format!("non-numeric 'time' property '{n}'"))
            })?,
            other => {
                return Err(RoutingError::MalformedFeature(format!(
                    "unexpected 'time' property type: {other}"
                )))
            }
        };
        let cutoff_minutes = (seconds as u32) / 60;
        let geometry = feature.geometry.ok_or_else(|| {
            RoutingError::MalformedFeature(format!(
                "feature at cutoff {cutoff_minutes}m has no geometry"
            ))
        })?;
        let geometry = geo_ops::from_geojson(geometry.value)
            .map_err(|e| RoutingError::MalformedFeature(e.to_string()))?;
        bands.insert(cutoff_minutes, geometry);
    }
    Ok(bands)
}

#[cfg(test)]
mod test {
    use super::*;
    use tripshed_core::model::TravelMode;

    fn query() -> IsochroneQuery {
        IsochroneQuery {
            lat: 40.75,
            lng: -73.99,
            mode: TravelMode::TransitBike,
            departure: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            day_type: DayType::Weekday,
        }
    }

    #[test]
    fn test_departure_timestamp_format() {
        let calendar = ServiceCalendar::default();
        let stamp = calendar.departure_timestamp(
            DayType::Weekday,
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        );
        assert_eq!(stamp, "2024-11-13T10:00:00-05:00");
    }

    #[test]
    fn test_saturday_uses_saturday_date() {
        let calendar = ServiceCalendar::default();
        let stamp = calendar
            .departure_timestamp(DayType::Saturday, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert!(stamp.starts_with("2024-11-16T08:30:00"));
    }

    #[test]
    fn test_isochrone_url_parameters() {
        let url = build_isochrone_url(
            "http://worker-3:8080/",
            &query(),
            &[15, 180],
            &ServiceCalendar::default(),
        )
        .unwrap();
        assert_eq!(url.path(), "/otp/traveltime/isochrone");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(pairs.contains(&("batch".to_string(), "true".to_string())));
        assert!(pairs.contains(&("location".to_string(), "40.75,-73.99".to_string())));
        assert!(pairs.contains(&("cutoff".to_string(), "PT15M".to_string())));
        assert!(pairs.contains(&("cutoff".to_string(), "PT180M".to_string())));
        assert!(pairs.contains(&("modes".to_string(), "TRANSIT".to_string())));
        assert!(pairs.contains(&("accessModes".to_string(), "BIKE".to_string())));
        assert!(pairs.contains(&("egressModes".to_string(), "BIKE".to_string())));
    }

    #[test]
    fn test_bands_from_features_seconds_to_minutes() {
        let raw = serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "time": "900" },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": { "time": "10800" },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 0.0]]]
                    }
                }
            ]
        });
        let collection: geojson::FeatureCollection = serde_json::from_value(raw).unwrap();
        let bands = bands_from_features(collection).unwrap();
        assert_eq!(bands.cutoffs(), vec![15, 180]);
    }

    #[test]
    fn test_empty_feature_collection_rejected() {
        let collection = geojson::FeatureCollection {
            bbox: None,
            features: vec![],
            foreign_members: None,
        };
        assert!(matches!(
            bands_from_features(collection),
            Err(RoutingError::EmptyFeatureCollection)
        ));
    }

    #[test]
    fn test_missing_time_property_rejected() {
        let raw = serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
                    }
                }
            ]
        });
        let collection: geojson::FeatureCollection = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            bands_from_features(collection),
            Err(RoutingError::MalformedFeature(_))
        ));
    }
}
