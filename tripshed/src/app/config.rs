use crate::routing::ServiceCalendar;
use crate::store::StoreOptions;
use serde::{Deserialize, Serialize};
use tripshed_core::model::cutoff::DEFAULT_CUTOFF_MINUTES;

/// typed deployment configuration. resolution precedence: process
/// environment (`TRIPSHED_*`, `__` as the section separator) over an
/// optional `tripshed.toml` next to the process, over the defaults below.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub routing: RoutingConfig,
    pub batch: BatchConfig,
    pub isochrone: IsochroneConfig,
    pub calendar: ServiceCalendar,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> DatabaseConfig {
        DatabaseConfig {
            path: String::from("tripshed.db"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig { port: 3000 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RoutingConfig {
    /// ordered worker base URLs; order defines affinity lanes
    pub workers: Vec<String>,
    /// shared connect+read timeout per routing request; heavy modes may
    /// need this raised substantially
    pub timeout_secs: u64,
    pub startup_attempts: u32,
    pub startup_interval_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> RoutingConfig {
        RoutingConfig {
            workers: vec![String::from("http://localhost:8080")],
            timeout_secs: 60,
            startup_attempts: 30,
            startup_interval_secs: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BatchConfig {
    pub size: u32,
    pub max_batches: u32,
    pub parallelism: usize,
    /// age at which a processing row counts as abandoned; defaults to twice
    /// the routing timeout when unset
    pub stale_horizon_secs: Option<u64>,
    /// region tags eligible for batching, highest priority first
    pub boroughs: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> BatchConfig {
        BatchConfig {
            size: 50,
            max_batches: 100,
            parallelism: 15,
            stale_horizon_secs: None,
            boroughs: vec![
                String::from("Manhattan"),
                String::from("Brooklyn"),
                String::from("Queens"),
                String::from("Bronx"),
                String::from("Staten Island"),
            ],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct IsochroneConfig {
    pub cutoffs: Vec<u32>,
}

impl Default for IsochroneConfig {
    fn default() -> IsochroneConfig {
        IsochroneConfig {
            cutoffs: DEFAULT_CUTOFF_MINUTES.to_vec(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<AppConfig, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("tripshed").required(false))
            .add_source(
                config::Environment::with_prefix("TRIPSHED")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("routing.workers")
                    .with_list_parse_key("batch.boroughs")
                    .with_list_parse_key("isochrone.cutoffs"),
            )
            .build()?;
        settings.try_deserialize()
    }

    pub fn stale_horizon_secs(&self) -> u64 {
        self.batch
            .stale_horizon_secs
            .unwrap_or(2 * self.routing.timeout_secs)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            cutoffs: self.isochrone.cutoffs.clone(),
            borough_priority: self.batch.boroughs.clone(),
            stale_horizon_secs: self.stale_horizon_secs(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = AppConfig::default();
        assert_eq!(config.isochrone.cutoffs, DEFAULT_CUTOFF_MINUTES.to_vec());
        assert_eq!(config.batch.boroughs[0], "Manhattan");
        assert_eq!(config.batch.parallelism, 15);
        assert_eq!(config.routing.timeout_secs, 60);
        assert_eq!(config.routing.startup_attempts, 30);
    }

    #[test]
    fn test_stale_horizon_tracks_routing_timeout() {
        let mut config = AppConfig::default();
        assert_eq!(config.stale_horizon_secs(), 120);
        config.routing.timeout_secs = 600;
        assert_eq!(config.stale_horizon_secs(), 1200);
        config.batch.stale_horizon_secs = Some(90);
        assert_eq!(config.stale_horizon_secs(), 90);
    }
}
