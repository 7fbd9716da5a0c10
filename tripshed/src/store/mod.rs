mod cache_store;
mod error;
mod schema;

pub use cache_store::{
    CacheStore, IntersectionStatus, ModeBandStats, ModeComparison, StoreOptions, StoreStats,
    Viewport,
};
pub use error::StoreError;
