mod client;
mod error;
mod fleet;
mod transport;

pub use client::{IsochroneQuery, IsochroneSource, RoutingClient};
pub use error::RoutingError;
pub use fleet::WorkerFleet;
pub use transport::{HttpTransport, IsochroneTransport, ServiceCalendar};
