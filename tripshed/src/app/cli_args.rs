use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tripshed",
    version,
    about = "batch isochrone pipeline and cache store for tri-state street intersections"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// drive the batch isochrone pipeline
    Batch {
        #[command(subcommand)]
        command: BatchCommand,
    },
    /// load prepared datasets into the cache store
    Ingest {
        #[command(subcommand)]
        command: IngestCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum BatchCommand {
    /// compute isochrones for pending origins until the queue drains
    Run {
        #[arg(default_value = "transit")]
        mode: String,
        #[arg(default_value = "10:00:00")]
        time: String,
        #[arg(default_value = "weekday")]
        day_type: String,
        #[arg(default_value_t = 15)]
        parallelism: usize,
    },
    /// print cache and queue statistics for a cache key
    Status {
        #[arg(default_value = "transit")]
        mode: String,
        #[arg(default_value = "10:00:00")]
        time: String,
        #[arg(default_value = "weekday")]
        day_type: String,
    },
    /// move failed origins back to pending for a cache key
    Retry {
        #[arg(default_value = "transit")]
        mode: String,
        #[arg(default_value = "10:00:00")]
        time: String,
        #[arg(default_value = "weekday")]
        day_type: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum IngestCommand {
    /// street intersections from a prepared CSV
    /// (id, osm_node_id, name, lat, lng, borough)
    Intersections { file: PathBuf },
    /// land boundary polygons from a GeoJSON file
    Land { file: PathBuf },
    /// transit stops from a prepared CSV
    /// (id, gtfs_stop_id, stop_name, lat, lng, stop_type, agency)
    Stops { file: PathBuf },
}
