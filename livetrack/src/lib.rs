//! LiveTrack - live transit vehicle tracking
//!
//! This library keeps a map-like render surface in sync with a transit
//! server's vehicle positions. It polls position snapshots, reconciles them
//! onto a vehicle pool layer, and lets one vehicle at a time be tracked with
//! an overlay of its trip path, stops and metadata.
//!
//! Drawing is left to a [`RenderSink`]; the library only emits
//! [`RenderOp`]s. [`LayerStore`] is an in-memory sink for headless use.

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod notification;
pub mod poller;
pub mod reconcile;
pub mod render;
pub mod tracking;
pub mod trip;

/// Crate version, used in the default `User-Agent`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use client::{HttpTransitClient, TransitClient};
pub use config::{ClientConfig, ConfigFile, ConfigKey, TrackerConfig};
pub use engine::{EngineCommand, EngineHandle, TrackingEngine};
pub use error::{EngineClosed, FetchError, Resource, TrackingError};
pub use model::{Coordinates, RouteType, VehicleId, VehiclePosition};
pub use notification::Notification;
pub use reconcile::{reconcile, Reconciliation};
pub use render::{Layer, LayerStore, RenderBatch, RenderOp, RenderSink};
pub use tracking::{DeselectReason, TrackingState, TrackingStateMachine};
pub use trip::{PathGeometry, ScheduledStop, StopRole, StopStatus, TripDetails, TripStop};
