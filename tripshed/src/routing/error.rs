/// failures raised by the routing client and fleet. the orchestrator does not
/// branch on variants; every error is persisted as its display string.
#[derive(thiserror::Error, Debug)]
pub enum RoutingError {
    #[error("request to routing worker failed: {0}")]
    Http(String),
    #[error("routing worker returned status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("invalid worker URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
    #[error("routing worker returned an empty feature collection")]
    EmptyFeatureCollection,
    #[error("malformed feature in worker response: {0}")]
    MalformedFeature(String),
    #[error("all per-cutoff fallback requests failed")]
    FallbackExhausted,
    #[error("worker fleet configuration is empty")]
    EmptyFleet,
}
