use crate::store::StoreError;

/// read-path failures, each carrying the HTTP status a thin handler should
/// answer with
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("{0}")]
    BadRequest(String),
    #[error("no cached isochrone matches this request")]
    NotFound,
    #[error("database failure: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl QueryError {
    pub fn status_code(&self) -> u16 {
        match self {
            QueryError::BadRequest(_) => 400,
            QueryError::NotFound => 404,
            QueryError::Store(_) | QueryError::Internal(_) => 500,
        }
    }
}
