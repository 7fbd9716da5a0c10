use super::{AppConfig, AppError};
use crate::batch::BatchOrchestrator;
use crate::routing::{HttpTransport, RoutingClient, WorkerFleet};
use crate::store::CacheStore;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tripshed_core::model::CacheKey;

pub fn open_store(config: &AppConfig) -> Result<Arc<CacheStore>, AppError> {
    let store = CacheStore::open(Path::new(&config.database.path), config.store_options())?;
    Ok(Arc::new(store))
}

/// `batch run`: wait for the fleet to come up, then loop batches until the
/// pending queue drains or the batch cap is reached
pub fn run(config: &AppConfig, key: &CacheKey, parallelism: usize) -> Result<(), AppError> {
    let store = open_store(config)?;
    let fleet = Arc::new(WorkerFleet::new(config.routing.workers.clone())?);
    let healthy = fleet.wait_until_healthy(
        config.routing.startup_attempts,
        Duration::from_secs(config.routing.startup_interval_secs),
    );
    if !healthy {
        return Err(AppError::FleetUnavailable);
    }

    let transport = HttpTransport::new(
        Duration::from_secs(config.routing.timeout_secs),
        config.calendar.clone(),
    )?;
    let client = Arc::new(RoutingClient::new(
        transport,
        config.isochrone.cutoffs.clone(),
    ));
    let orchestrator = BatchOrchestrator::new(store.clone(), client, fleet, parallelism)?;

    let total = store.priority_origin_count()?;
    let mut cached = store.completed_origin_count(key)?;
    println!("batch run for {key}: {cached}/{total} origins cached");

    for batch_number in 1..=config.batch.max_batches {
        let batch_start = Instant::now();
        let outcome = orchestrator.run_batch(key, config.batch.size)?;
        if outcome.attempted == 0 {
            println!("queue drained after {} batch(es)", batch_number - 1);
            break;
        }
        let now_cached = store.completed_origin_count(key)?;
        let elapsed = batch_start.elapsed().as_secs_f64().max(f64::EPSILON);
        println!(
            "batch {batch_number}: {now_cached}/{total} cached (+{}), {:.2} origins/s, {} failed, {} remaining",
            now_cached - cached,
            outcome.attempted as f64 / elapsed,
            outcome.failed,
            total - now_cached,
        );
        cached = now_cached;
    }
    Ok(())
}

/// `batch status`: print cache coverage and queue counters for one key
pub fn status(config: &AppConfig, key: &CacheKey) -> Result<(), AppError> {
    let store = open_store(config)?;
    let stats = store.stats(key)?;
    let completed = store.completed_origin_count(key)?;

    println!("cache key {key}");
    println!("  intersections: {}", stats.total_intersections);
    println!("  fully cached:  {completed}");
    for band in &stats.bands {
        let oldest = band
            .oldest
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| String::from("-"));
        let newest = band
            .newest
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| String::from("-"));
        println!(
            "  bands[{}]: {} rows (oldest {oldest}, newest {newest})",
            band.mode, band.band_rows
        );
    }
    for (status, count) in &stats.statuses {
        println!("  status[{status}]: {count}");
    }
    Ok(())
}

/// `batch retry`: clear failed state so the next run picks those origins up
pub fn retry(config: &AppConfig, key: &CacheKey) -> Result<(), AppError> {
    let store = open_store(config)?;
    let moved = store.reset_failed(key)?;
    println!("moved {moved} failed origin(s) back to pending for {key}");
    Ok(())
}
