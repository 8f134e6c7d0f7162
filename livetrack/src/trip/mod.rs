//! Trip overlays for the tracked vehicle.
//!
//! [`TripOverlay`] holds what has arrived for the current selection;
//! [`TripDetailFetcher`] issues the three concurrent fetches that fill it.

mod fetcher;
mod model;

pub use fetcher::{TripDetailFetcher, TripFetchResult, TripPart};
pub use model::{
    classify_stops, PathGeometry, ScheduledStop, ServiceTime, StopRole, StopStatus, TripDetails,
    TripOverlay, TripStop,
};
