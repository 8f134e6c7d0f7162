//! Error types for fetching and tracking.
//!
//! Nothing in this crate treats a fetch failure as fatal. Transport errors are
//! [`FetchError`]s; the engine wraps them into [`TrackingError`]s and reports
//! them as notifications while keeping the previously rendered state.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::model::VehicleId;

/// The four remote resources the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    Positions,
    TripShape,
    TripStops,
    TripDetails,
}

impl Resource {
    /// The three resources fetched for a trip overlay, in request order.
    pub const TRIP: [Resource; 3] = [
        Resource::TripShape,
        Resource::TripStops,
        Resource::TripDetails,
    ];

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Positions => "vehicle positions",
            Resource::TripShape => "trip shape",
            Resource::TripStops => "trip stops",
            Resource::TripDetails => "trip details",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single network read.
///
/// Every variant is transient: the next poll tick or the next selection
/// retries from scratch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The request could not be sent or the body could not be read.
    #[error("Request failed: {0}")]
    Request(String),

    /// The body was received but is not the expected shape.
    #[error("Failed to decode {resource}: {message}")]
    Decode { resource: Resource, message: String },

    /// The request did not complete in time.
    #[error("{resource} request timed out after {after:?}")]
    Timeout { resource: Resource, after: Duration },
}

/// Errors reported by the tracking engine through its notification channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    /// A fetch failed and nothing was rendered from it.
    #[error("Failed to fetch {resource}: {source}")]
    Transient {
        resource: Resource,
        #[source]
        source: FetchError,
    },

    /// Some trip overlay fetches failed; the overlay shows the rest.
    #[error(
        "Trip overlay for vehicle {vehicle_id} is incomplete ({} unavailable)",
        join_resources(.failed)
    )]
    PartialOverlay {
        vehicle_id: VehicleId,
        failed: Vec<Resource>,
    },
}

impl TrackingError {
    /// The resources this error concerns.
    pub fn resources(&self) -> Vec<Resource> {
        match self {
            TrackingError::Transient { resource, .. } => vec![*resource],
            TrackingError::PartialOverlay { failed, .. } => failed.clone(),
        }
    }
}

/// Returned by [`crate::engine::EngineHandle`] once the engine has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Tracking engine has shut down")]
pub struct EngineClosed;

fn join_resources(resources: &[Resource]) -> String {
    resources
        .iter()
        .map(Resource::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::Http {
            status: 503,
            url: "http://localhost/api/positions".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503 from http://localhost/api/positions");

        let err = FetchError::Timeout {
            resource: Resource::TripStops,
            after: Duration::from_secs(2),
        };
        assert!(err.to_string().contains("trip stops"));
    }

    #[test]
    fn test_partial_overlay_lists_failed_resources() {
        let err = TrackingError::PartialOverlay {
            vehicle_id: VehicleId::new("77"),
            failed: vec![Resource::TripShape, Resource::TripDetails],
        };
        let message = err.to_string();
        assert!(message.contains("vehicle 77"));
        assert!(message.contains("trip shape, trip details"));
        assert_eq!(
            err.resources(),
            vec![Resource::TripShape, Resource::TripDetails]
        );
    }

    #[test]
    fn test_transient_error_exposes_source() {
        use std::error::Error as _;

        let err = TrackingError::Transient {
            resource: Resource::Positions,
            source: FetchError::Request("connection refused".to_string()),
        };
        assert!(err.source().is_some());
        assert_eq!(err.resources(), vec![Resource::Positions]);
    }
}
