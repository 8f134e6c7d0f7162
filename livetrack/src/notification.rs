//! Engine notifications.
//!
//! Broadcast to every subscriber of [`crate::engine::EngineHandle`]. Sending
//! never blocks the engine; a subscriber that falls behind loses the oldest
//! notifications.

use std::fmt;

use crate::error::TrackingError;
use crate::model::VehicleId;
use crate::tracking::DeselectReason;

/// Something observers of the engine may want to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A non-fatal failure. Rendered state was kept as it was.
    Error(TrackingError),

    /// A vehicle became the tracked vehicle.
    TrackingStarted { vehicle_id: VehicleId, trip_id: String },

    /// The tracked vehicle was released.
    TrackingReleased {
        vehicle_id: VehicleId,
        reason: DeselectReason,
    },

    /// A position snapshot was reconciled onto the layers.
    SnapshotApplied { tick: u64, vehicles: usize },
}

impl Notification {
    pub fn is_error(&self) -> bool {
        matches!(self, Notification::Error(_))
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Error(error) => write!(f, "error: {}", error),
            Notification::TrackingStarted {
                vehicle_id,
                trip_id,
            } => write!(f, "tracking vehicle {} on trip {}", vehicle_id, trip_id),
            Notification::TrackingReleased { vehicle_id, reason } => {
                write!(f, "released vehicle {} ({})", vehicle_id, reason)
            }
            Notification::SnapshotApplied { tick, vehicles } => {
                write!(f, "snapshot {} applied ({} vehicles)", tick, vehicles)
            }
        }
    }
}
