//! Transport client abstraction.
//!
//! The engine reads four resources from the transit server. [`TransitClient`]
//! abstracts those reads so the engine can run against the HTTP
//! implementation or a scripted one in tests.
//!
//! # Endpoints
//!
//! ```text
//! GET /api/positions?routes_info&bearings   vehicle snapshot
//! GET /api/trips/{trip_id}/shape?geojson    trip path (GeoJSON)
//! GET /api/trips/{trip_id}/stops            scheduled stops
//! GET /api/trips/{trip_id}                  agency, headsign, route description
//! ```

mod http;
mod wire;

pub use http::HttpTransitClient;
pub use wire::{decode_details, decode_positions, decode_shape, decode_stops};

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{FetchError, Resource};
use crate::model::VehiclePosition;
use crate::trip::{PathGeometry, ScheduledStop, TripDetails};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read access to the transit server.
///
/// Implementations must be `Send + Sync`; the engine shares one client
/// between the poller and the trip fetch tasks through an `Arc`.
pub trait TransitClient: Send + Sync {
    /// Fetch the full vehicle snapshot.
    fn positions(&self) -> BoxFuture<'_, Result<Vec<VehiclePosition>, FetchError>>;

    /// Fetch the path geometry of a trip.
    fn trip_shape(&self, trip_id: &str) -> BoxFuture<'_, Result<PathGeometry, FetchError>>;

    /// Fetch the scheduled stops of a trip.
    fn trip_stops(&self, trip_id: &str) -> BoxFuture<'_, Result<Vec<ScheduledStop>, FetchError>>;

    /// Fetch display metadata for a trip.
    fn trip_details(&self, trip_id: &str) -> BoxFuture<'_, Result<TripDetails, FetchError>>;
}

/// Run `fut`, failing with [`FetchError::Timeout`] after `after`.
pub async fn with_timeout<T, F>(resource: Resource, after: Duration, fut: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout { resource, after }),
    }
}
