use crate::batch::BatchError;
use crate::routing::RoutingError;
use crate::store::StoreError;
use std::path::PathBuf;
use tripshed_core::model::ModelError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("routing worker fleet never became healthy")]
    FleetUnavailable,
    #[error("error reading from '{path}': {message}")]
    Ingest { path: PathBuf, message: String },
}
