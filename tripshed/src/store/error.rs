use tripshed_core::model::ModelError;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database failure: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("geometry codec failure: {0}")]
    Geometry(String),
    #[error("unexpected batch status value '{0}' in database")]
    UnexpectedStatus(String),
}

impl From<ModelError> for StoreError {
    fn from(e: ModelError) -> StoreError {
        StoreError::Geometry(e.to_string())
    }
}
