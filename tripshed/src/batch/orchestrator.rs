use crate::routing::{IsochroneQuery, IsochroneSource, WorkerFleet};
use crate::store::{CacheStore, StoreError};
use rayon::prelude::*;
use std::sync::Arc;
use tripshed_core::model::{CacheKey, Intersection};

/// recorded verbatim when a computation succeeds but its largest band came
/// back without coordinates, the signature of a truncated search
pub const EMPTY_ISOCHRONE_ERROR: &str = "Empty isochrone - no reachable area";

#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    #[error("store failure outside a task boundary: {0}")]
    Store(#[from] StoreError),
    #[error("failed to build worker pool: {0}")]
    Pool(String),
}

/// per-batch counters surfaced to the CLI driver. individual origin failures
/// never escape a task; they land here and in `batch_status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// drives pending origins through the routing fleet.
///
/// origins selected at index i are dispatched to worker `i mod N`. because
/// the selection query orders deterministically, a re-run over the same
/// pending set sends each origin back to the worker whose routing caches
/// already saw it.
pub struct BatchOrchestrator<S: IsochroneSource> {
    store: Arc<CacheStore>,
    source: Arc<S>,
    fleet: Arc<WorkerFleet>,
    pool: rayon::ThreadPool,
}

impl<S: IsochroneSource> BatchOrchestrator<S> {
    pub fn new(
        store: Arc<CacheStore>,
        source: Arc<S>,
        fleet: Arc<WorkerFleet>,
        parallelism: usize,
    ) -> Result<BatchOrchestrator<S>, BatchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism.max(1))
            .build()
            .map_err(|e| BatchError::Pool(e.to_string()))?;
        Ok(BatchOrchestrator {
            store,
            source,
            fleet,
            pool,
        })
    }

    /// selects one batch of pending origins and processes them in parallel.
    /// returns counters; an empty `attempted` means the queue has drained.
    pub fn run_batch(&self, key: &CacheKey, batch_size: u32) -> Result<BatchOutcome, BatchError> {
        let pending = self.store.get_pending(key, batch_size)?;
        if pending.is_empty() {
            return Ok(BatchOutcome::default());
        }
        log::info!(
            "dispatching {} origins for {key} across {} workers",
            pending.len(),
            self.fleet.len()
        );
        let results: Vec<bool> = self.pool.install(|| {
            pending
                .par_iter()
                .enumerate()
                .map(|(index, origin)| self.process_origin(origin, self.fleet.worker(index), key))
                .collect()
        });
        let succeeded = results.iter().filter(|ok| **ok).count();
        Ok(BatchOutcome {
            attempted: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        })
    }

    /// one origin's walk through the status machine:
    /// processing, then completed on a validated save, failed otherwise
    fn process_origin(&self, origin: &Intersection, worker_url: &str, key: &CacheKey) -> bool {
        if let Err(e) = self.store.mark_processing(origin.id, key) {
            log::error!("origin {}: could not mark processing: {e}", origin.id);
            return false;
        }

        let query = IsochroneQuery {
            lat: origin.lat,
            lng: origin.lng,
            mode: key.mode,
            departure: key.departure,
            day_type: key.day_type,
        };
        let bands = match self.source.compute_isochrones(&query, worker_url) {
            Ok(bands) => bands,
            Err(e) => {
                log::warn!("origin {} failed on {worker_url}: {e}", origin.id);
                self.record_failure(origin.id, key, &e.to_string());
                return false;
            }
        };

        // a blank largest band means the search was truncated; persist
        // nothing so the origin can be retried after a reset
        let largest_cutoff = self.store.cutoffs().iter().copied().max().unwrap_or(0);
        if bands.is_blank_at(largest_cutoff) {
            log::warn!(
                "origin {} returned an empty {largest_cutoff}m band",
                origin.id
            );
            self.record_failure(origin.id, key, EMPTY_ISOCHRONE_ERROR);
            return false;
        }

        if let Err(e) = self.store.save_isochrone(origin.id, key, &bands) {
            log::error!("origin {}: band save failed: {e}", origin.id);
            self.record_failure(origin.id, key, &e.to_string());
            return false;
        }
        if let Err(e) = self.store.mark_completed(origin.id, key) {
            // the processing row stays behind and re-queues once stale
            log::error!("origin {}: could not mark completed: {e}", origin.id);
            return false;
        }
        log::debug!("origin {} cached via {worker_url}", origin.id);
        true
    }

    fn record_failure(&self, origin_id: i64, key: &CacheKey, message: &str) {
        if let Err(e) = self.store.mark_failed(origin_id, key, message) {
            log::error!("origin {origin_id}: could not mark failed: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::routing::RoutingError;
    use crate::store::StoreOptions;
    use geo::{polygon, Geometry, LineString, Polygon};
    use parking_lot::Mutex;
    use tripshed_core::model::cutoff::DEFAULT_CUTOFF_MINUTES;
    use tripshed_core::model::{BandSet, BatchStatus};

    fn square(size: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: size, y: 0.0),
            (x: size, y: size),
            (x: 0.0, y: size),
            (x: 0.0, y: 0.0),
        ])
    }

    fn distinct_bands() -> BandSet {
        DEFAULT_CUTOFF_MINUTES
            .into_iter()
            .map(|c| (c, square(c as f64 * 0.001)))
            .collect()
    }

    /// one band per cutoff but with an empty largest polygon
    fn truncated_bands() -> BandSet {
        let mut bands = distinct_bands();
        bands.insert(
            180,
            Geometry::Polygon(Polygon::new(LineString::new(vec![]), vec![])),
        );
        bands
    }

    #[derive(Default)]
    struct FixtureSource {
        /// (origin lat, worker url) per call, for affinity assertions
        calls: Mutex<Vec<(f64, String)>>,
        truncate: bool,
        fail_all: bool,
    }

    impl IsochroneSource for FixtureSource {
        fn compute_isochrones(
            &self,
            query: &IsochroneQuery,
            worker_url: &str,
        ) -> Result<BandSet, RoutingError> {
            self.calls.lock().push((query.lat, worker_url.to_string()));
            if self.fail_all {
                return Err(RoutingError::Http("connection refused".to_string()));
            }
            if self.truncate {
                return Ok(truncated_bands());
            }
            Ok(distinct_bands())
        }
    }

    fn store_with_origins(n: i64) -> Arc<CacheStore> {
        let store = CacheStore::open_in_memory(StoreOptions::default()).unwrap();
        let origins: Vec<_> = (1..=n)
            .map(|id| tripshed_core::model::Intersection {
                id,
                osm_node_id: 7_000_000 + id,
                name: format!("intersection {id}"),
                // unique latitude per origin so fixtures can identify callers
                lat: 40.0 + id as f64 * 0.001,
                lng: -74.0,
                borough: String::from("Manhattan"),
                sample_group: id % 4,
            })
            .collect();
        store.insert_intersections(&origins).unwrap();
        Arc::new(store)
    }

    fn fleet(n: usize) -> Arc<WorkerFleet> {
        let urls = (0..n).map(|i| format!("http://worker-{i}:8080")).collect();
        Arc::new(WorkerFleet::new(urls).unwrap())
    }

    fn key() -> CacheKey {
        CacheKey::parse("transit", "10:00:00", "weekday").unwrap()
    }

    #[test]
    fn test_single_origin_success() {
        let store = store_with_origins(1);
        let orchestrator = BatchOrchestrator::new(
            store.clone(),
            Arc::new(FixtureSource::default()),
            fleet(15),
            1,
        )
        .unwrap();

        let outcome = orchestrator.run_batch(&key(), 10).unwrap();
        assert_eq!(outcome.attempted, 1);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed, 0);

        let bands = store.cached_isochrone(1, &key()).unwrap().unwrap();
        assert_eq!(bands.len(), 8);
        let (status, error) = store.batch_status(1, &key()).unwrap().unwrap();
        assert_eq!(status, BatchStatus::Completed);
        assert_eq!(error, None);
    }

    #[test]
    fn test_truncated_search_records_failure_without_bands() {
        let store = store_with_origins(1);
        let source = Arc::new(FixtureSource {
            truncate: true,
            ..FixtureSource::default()
        });
        let orchestrator =
            BatchOrchestrator::new(store.clone(), source, fleet(15), 1).unwrap();

        let outcome = orchestrator.run_batch(&key(), 10).unwrap();
        assert_eq!(outcome.failed, 1);

        assert!(store.cached_isochrone(1, &key()).unwrap().is_none());
        let (status, error) = store.batch_status(1, &key()).unwrap().unwrap();
        assert_eq!(status, BatchStatus::Failed);
        assert_eq!(error.as_deref(), Some(EMPTY_ISOCHRONE_ERROR));
    }

    #[test]
    fn test_routing_error_persisted_as_failure() {
        let store = store_with_origins(1);
        let source = Arc::new(FixtureSource {
            fail_all: true,
            ..FixtureSource::default()
        });
        let orchestrator =
            BatchOrchestrator::new(store.clone(), source, fleet(15), 1).unwrap();

        let outcome = orchestrator.run_batch(&key(), 10).unwrap();
        assert_eq!(outcome.failed, 1);
        let (status, error) = store.batch_status(1, &key()).unwrap().unwrap();
        assert_eq!(status, BatchStatus::Failed);
        assert!(error.unwrap().contains("connection refused"));
    }

    #[test]
    fn test_affinity_assigns_origins_by_index_mod_fleet_size() {
        let store = store_with_origins(30);
        let source = Arc::new(FixtureSource::default());
        let orchestrator =
            BatchOrchestrator::new(store.clone(), source.clone(), fleet(15), 4).unwrap();

        let outcome = orchestrator.run_batch(&key(), 30).unwrap();
        assert_eq!(outcome.attempted, 30);
        assert_eq!(outcome.succeeded, 30);

        // selection orders by id, so origin id maps to index id-1 and worker
        // (id-1) mod 15; lat encodes the id
        let calls = source.calls.lock();
        assert_eq!(calls.len(), 30);
        for (lat, worker_url) in calls.iter() {
            let id = ((lat - 40.0) / 0.001).round() as i64;
            let expected = format!("http://worker-{}:8080", (id - 1) % 15);
            assert_eq!(
                worker_url, &expected,
                "origin {id} dispatched to the wrong worker"
            );
        }
    }

    #[test]
    fn test_rerun_reuses_worker_assignment() {
        let store = store_with_origins(6);
        let source = Arc::new(FixtureSource {
            fail_all: true,
            ..FixtureSource::default()
        });
        let orchestrator =
            BatchOrchestrator::new(store.clone(), source.clone(), fleet(3), 2).unwrap();

        orchestrator.run_batch(&key(), 6).unwrap();
        store.reset_failed(&key()).unwrap();
        orchestrator.run_batch(&key(), 6).unwrap();

        let calls = source.calls.lock();
        assert_eq!(calls.len(), 12);
        let first: Vec<_> = calls[..6].to_vec();
        let mut second: Vec<_> = calls[6..].to_vec();
        second.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut first_sorted = first.clone();
        first_sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        assert_eq!(first_sorted, second);
    }

    #[test]
    fn test_collapsed_worker_response_still_completes_via_fallback() {
        use crate::routing::{IsochroneTransport, RoutingClient};

        /// repeats one shape on multi-cutoff requests, answers per-cutoff
        /// requests with distinct shapes
        struct CollapsingTransport;
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
                Ok([(cutoffs[0], square(cutoffs[0] as f64 * 0.001))]
                    .into_iter()
                    .collect())
            }
        }

        let store = store_with_origins(1);
        let client = Arc::new(RoutingClient::new(
            CollapsingTransport,
            DEFAULT_CUTOFF_MINUTES.to_vec(),
        ));
        let orchestrator =
            BatchOrchestrator::new(store.clone(), client, fleet(15), 1).unwrap();

        let outcome = orchestrator.run_batch(&key(), 10).unwrap();
        assert_eq!(outcome.succeeded, 1);
        let bands = store.cached_isochrone(1, &key()).unwrap().unwrap();
        assert_eq!(bands.len(), 8);
        let (status, _) = store.batch_status(1, &key()).unwrap().unwrap();
        assert_eq!(status, BatchStatus::Completed);
    }

    #[test]
    fn test_drained_queue_reports_empty_outcome() {
        let store = store_with_origins(1);
        let orchestrator = BatchOrchestrator::new(
            store.clone(),
            Arc::new(FixtureSource::default()),
            fleet(15),
            1,
        )
        .unwrap();
        orchestrator.run_batch(&key(), 10).unwrap();
        let outcome = orchestrator.run_batch(&key(), 10).unwrap();
        assert_eq!(outcome, BatchOutcome::default());
    }
}
