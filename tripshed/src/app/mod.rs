mod batch_app;
mod cli_args;
mod config;
mod error;
mod ingest_app;

pub use cli_args::{BatchCommand, CliArgs, Command, IngestCommand};
pub use config::{AppConfig, BatchConfig, DatabaseConfig, IsochroneConfig, RoutingConfig, ServerConfig};
pub use error::AppError;

use tripshed_core::model::CacheKey;

/// top-level CLI dispatch
pub fn run(args: CliArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    match args.command {
        Command::Batch { command } => match command {
            BatchCommand::Run {
                mode,
                time,
                day_type,
                parallelism,
            } => {
                let key = CacheKey::parse(&mode, &time, &day_type)?;
                batch_app::run(&config, &key, parallelism)
            }
            BatchCommand::Status {
                mode,
                time,
                day_type,
            } => {
                let key = CacheKey::parse(&mode, &time, &day_type)?;
                batch_app::status(&config, &key)
            }
            BatchCommand::Retry {
                mode,
                time,
                day_type,
            } => {
                let key = CacheKey::parse(&mode, &time, &day_type)?;
                batch_app::retry(&config, &key)
            }
        },
        Command::Ingest { command } => match command {
            IngestCommand::Intersections { file } => ingest_app::intersections(&config, &file),
            IngestCommand::Land { file } => ingest_app::land(&config, &file),
            IngestCommand::Stops { file } => ingest_app::stops(&config, &file),
        },
    }
}
