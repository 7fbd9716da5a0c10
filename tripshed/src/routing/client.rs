use super::{IsochroneTransport, RoutingError};
use chrono::NaiveTime;
use rayon::prelude::*;
use tripshed_core::model::{BandSet, DayType, TravelMode};

/// one origin's computation request: a location plus the non-origin
/// dimensions of its cache key
#[derive(Debug, Clone, PartialEq)]
pub struct IsochroneQuery {
    pub lat: f64,
    pub lng: f64,
    pub mode: TravelMode,
    pub departure: NaiveTime,
    pub day_type: DayType,
}

/// the whole-client seam the orchestrator dispatches through
pub trait IsochroneSource: Send + Sync {
    fn compute_isochrones(
        &self,
        query: &IsochroneQuery,
        worker_url: &str,
    ) -> Result<BandSet, RoutingError>;
}

/// stateless wrapper over one routing-worker request at a time.
///
/// issues a single request carrying every cutoff, then checks for a known
/// worker defect where the shortest-path-tree projection collapses to one
/// shape across cutoffs. when fewer than two distinct geometries come back,
/// re-issues one request per cutoff in parallel and merges whichever
/// succeed. the client never retries; retry policy belongs to the batch
/// orchestrator.
pub struct RoutingClient<T: IsochroneTransport> {
    transport: T,
    cutoffs: Vec<u32>,
}

impl<T: IsochroneTransport> RoutingClient<T> {
    pub fn new(transport: T, cutoffs: Vec<u32>) -> RoutingClient<T> {
        RoutingClient { transport, cutoffs }
    }

    pub fn cutoffs(&self) -> &[u32] {
        &self.cutoffs
    }

    fn per_cutoff_fallback(
        &self,
        query: &IsochroneQuery,
        worker_url: &str,
    ) -> Result<BandSet, RoutingError> {
        let partials: Vec<BandSet> = self
            .cutoffs
            .par_iter()
            .filter_map(|cutoff| {
                match self.transport.request_bands(query, &[*cutoff], worker_url) {
                    Ok(bands) => Some(bands),
                    Err(e) => {
                        log::warn!("fallback request for cutoff {cutoff}m failed: {e}");
                        None
                    }
                }
            })
            .collect();

        let mut merged = BandSet::new();
        for partial in partials {
            merged.merge(partial);
        }
        if merged.is_empty() {
            return Err(RoutingError::FallbackExhausted);
        }
        Ok(merged)
    }
}

impl<T: IsochroneTransport> IsochroneSource for RoutingClient<T> {
    fn compute_isochrones(
        &self,
        query: &IsochroneQuery,
        worker_url: &str,
    ) -> Result<BandSet, RoutingError> {
        let bands = self
            .transport
            .request_bands(query, &self.cutoffs, worker_url)?;
        if self.cutoffs.len() < 2 || bands.distinct_geometry_count() >= 2 {
            return Ok(bands);
        }
        log::warn!(
            "multi-cutoff response collapsed to {} distinct shape(s) across {} cutoffs, \
             falling back to per-cutoff requests",
            bands.distinct_geometry_count(),
            self.cutoffs.len()
        );
        self.per_cutoff_fallback(query, worker_url)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use geo::{polygon, Geometry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tripshed_core::model::cutoff::DEFAULT_CUTOFF_MINUTES;

    fn square(size: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: size, y: 0.0),
            (x: size, y: size),
            (x: 0.0, y: size),
            (x: 0.0, y: 0.0),
        ])
    }

    fn query() -> IsochroneQuery {
        IsochroneQuery {
            lat: 40.75,
            lng: -73.99,
            mode: TravelMode::Transit,
            departure: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            day_type: DayType::Weekday,
        }
    }

    /// collapses the multi-cutoff response to one repeated shape, answers
    /// per-cutoff requests with distinct shapes, and counts single-cutoff
    /// calls
    struct CollapsingTransport {
        single_cutoff_calls: AtomicUsize,
        failing_cutoff: Option<u32>,
    }

    impl IsochroneTransport for CollapsingTransport {
        fn request_bands(
            &self,
            _query: &IsochroneQuery,
            cutoffs: &[u32],
            _worker_url: &str,
        ) -> Result<BandSet, RoutingError> {
            if cutoffs.len() > 1 {
                return Ok(cutoffs.iter().map(|c| (*c, square(1.0))).collect());
            }
            self.single_cutoff_calls.fetch_add(1, Ordering::SeqCst);
            let cutoff = cutoffs[0];
            if Some(cutoff) == self.failing_cutoff {
                return Err(RoutingError::Http("connection reset".to_string()));
            }
            Ok([(cutoff, square(cutoff as f64))].into_iter().collect())
        }
    }

    struct HealthyTransport;

    impl IsochroneTransport for HealthyTransport {
        fn request_bands(
            &self,
            _query: &IsochroneQuery,
            cutoffs: &[u32],
            _worker_url: &str,
        ) -> Result<BandSet, RoutingError> {
            Ok(cutoffs.iter().map(|c| (*c, square(*c as f64))).collect())
        }
    }

    #[test]
    fn test_healthy_response_issues_single_request() {
        let client = RoutingClient::new(HealthyTransport, DEFAULT_CUTOFF_MINUTES.to_vec());
        let bands = client
            .compute_isochrones(&query(), "http://worker-0:8080")
            .unwrap();
        assert_eq!(bands.len(), 8);
        assert_eq!(bands.distinct_geometry_count(), 8);
    }

    #[test]
    fn test_collapsed_response_triggers_per_cutoff_fallback() {
        let transport = CollapsingTransport {
            single_cutoff_calls: AtomicUsize::new(0),
            failing_cutoff: None,
        };
        let client = RoutingClient::new(transport, DEFAULT_CUTOFF_MINUTES.to_vec());
        let bands = client
            .compute_isochrones(&query(), "http://worker-0:8080")
            .unwrap();
        assert_eq!(
            client.transport.single_cutoff_calls.load(Ordering::SeqCst),
            8
        );
        assert_eq!(bands.len(), 8);
        assert_eq!(bands.distinct_geometry_count(), 8);
    }

    #[test]
    fn test_fallback_tolerates_individual_failures() {
        let transport = CollapsingTransport {
            single_cutoff_calls: AtomicUsize::new(0),
            failing_cutoff: Some(90),
        };
        let client = RoutingClient::new(transport, DEFAULT_CUTOFF_MINUTES.to_vec());
        let bands = client
            .compute_isochrones(&query(), "http://worker-0:8080")
            .unwrap();
        assert_eq!(bands.len(), 7);
        assert!(bands.get(90).is_none());
        assert!(bands.get(180).is_some());
    }

    #[test]
    fn test_single_cutoff_configuration_never_falls_back() {
        let transport = CollapsingTransport {
            single_cutoff_calls: AtomicUsize::new(0),
            failing_cutoff: None,
        };
        let client = RoutingClient::new(transport, vec![30]);
        let bands = client
            .compute_isochrones(&query(), "http://worker-0:8080")
            .unwrap();
        assert_eq!(bands.len(), 1);
        // the one configured cutoff went out in the initial request
        assert_eq!(
            client.transport.single_cutoff_calls.load(Ordering::SeqCst),
            1
        );
    }

    #[test]
    fn test_transport_error_propagates() {
        struct FailingTransport;
        impl IsochroneTransport for FailingTransport {
            fn request_bands(
                &self,
                _query: &IsochroneQuery,
                _cutoffs: &[u32],
                _worker_url: &str,
            ) -> Result<BandSet, RoutingError> {
                Err(RoutingError::Status {
                    status: 503,
                    url: "http://worker-0:8080".to_string(),
                })
            }
        }
        let client = RoutingClient::new(FailingTransport, DEFAULT_CUTOFF_MINUTES.to_vec());
        let result = client.compute_isochrones(&query(), "http://worker-0:8080");
        assert!(matches!(result, Err(RoutingError::Status { status: 503, .. })));
    }
}
