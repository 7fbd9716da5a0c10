use super::RoutingError;
use std::time::Duration;

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// static ordered directory of routing-worker base URLs.
///
/// origin index i is served by worker `i mod N`, so repeated batches over a
/// stable pending set land each origin on the same worker and reuse that
/// worker's warm routing caches.
pub struct WorkerFleet {
    base_urls: Vec<String>,
    http: reqwest::blocking::Client,
}

impl WorkerFleet {
    pub fn new(base_urls: Vec<String>) -> Result<WorkerFleet, RoutingError> {
        if base_urls.is_empty() {
            return Err(RoutingError::EmptyFleet);
        }
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(HEALTH_PROBE_TIMEOUT)
            .timeout(HEALTH_PROBE_TIMEOUT)
            .build()
            .map_err(|e| RoutingError::Http(e.to_string()))?;
        Ok(WorkerFleet { base_urls, http })
    }

    pub fn len(&self) -> usize {
        self.base_urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base_urls.is_empty()
    }

    pub fn worker(&self, index: usize) -> &str {
        &self.base_urls[index % self.base_urls.len()]
    }

    /// probes the first worker's root path. the fleet shares one deployment,
    /// so one responsive worker implies the graph finished loading.
    pub fn health_check(&self) -> bool {
        let url = format!("{}/", self.base_urls[0].trim_end_matches('/'));
        match self.http.get(&url).send() {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                log::debug!("health probe against {url} failed: {e}");
                false
            }
        }
    }

    /// polls the health probe up to `attempts` times. the routing graph can
    /// take minutes to load on a cold fleet.
    pub fn wait_until_healthy(&self, attempts: u32, interval: Duration) -> bool {
        for attempt in 1..=attempts {
            if self.health_check() {
                log::info!("routing fleet healthy after {attempt} probe(s)");
                return true;
            }
            log::info!(
                "routing fleet not ready (attempt {attempt}/{attempts}), retrying in {}s",
                interval.as_secs()
            );
            if attempt < attempts {
                std::thread::sleep(interval);
            }
        }
        false
    }
}
