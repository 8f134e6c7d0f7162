//! Single-selection tracking state machine.
//!
//! # State Machine
//!
//! ```text
//! Untracked --[select(v)]--> Tracked(v)
//! Tracked(a) --[select(b)]--> Tracked(b)   (overlays cleared first)
//! Tracked(a) --[deselect]--> Untracked     (overlays cleared)
//! Untracked --[deselect]--> Untracked      (no-op)
//! ```
//!
//! Every transition bumps a generation counter. Trip fetches are tagged with
//! the [`SelectionToken`] of the selection that issued them, and results are
//! applied only while that token is still current.

use std::fmt;

use tracing::debug;

use crate::model::{VehicleId, VehiclePosition};
use crate::render::{Layer, RenderBatch, RenderOp};

/// Current tracking state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrackingState {
    #[default]
    Untracked,
    Tracked(VehicleId),
}

/// Identifies one selection transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectionToken {
    generation: u64,
    vehicle_id: VehicleId,
}

impl SelectionToken {
    pub fn new(generation: u64, vehicle_id: VehicleId) -> Self {
        Self {
            generation,
            vehicle_id,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }
}

/// Why a tracked vehicle was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeselectReason {
    /// The user pressed escape.
    EscapeKey,
    /// The user chose "untrack".
    Untrack,
    /// The overlay popup was closed.
    OverlayClosed,
    /// The vehicle was missing from too many consecutive snapshots.
    VehicleLost,
}

impl fmt::Display for DeselectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DeselectReason::EscapeKey => "escape key",
            DeselectReason::Untrack => "untrack",
            DeselectReason::OverlayClosed => "overlay closed",
            DeselectReason::VehicleLost => "vehicle lost",
        };
        f.write_str(text)
    }
}

/// Result of a `select` transition.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Token to tag the trip fetches with.
    pub token: SelectionToken,
    /// The previously tracked vehicle, if any.
    pub previous: Option<VehicleId>,
    /// Clear ops for every trip-related layer, then the tracked marker.
    pub batch: RenderBatch,
}

/// Result of a `deselect` transition.
#[derive(Debug, Clone)]
pub struct Deselection {
    /// The vehicle that was tracked.
    pub vehicle_id: VehicleId,
    /// Clear ops for every trip-related layer.
    pub batch: RenderBatch,
}

/// Owns the tracked-vehicle selection.
#[derive(Debug)]
pub struct TrackingStateMachine {
    state: TrackingState,
    generation: u64,
    missing_ticks: u32,
    release_after_missing_ticks: u32,
}

impl Default for TrackingStateMachine {
    fn default() -> Self {
        Self::new(0)
    }
}

impl TrackingStateMachine {
    /// Create an untracked state machine.
    ///
    /// `release_after_missing_ticks` is the number of consecutive snapshots
    /// without the tracked vehicle after which it is released; 0 never
    /// releases.
    pub fn new(release_after_missing_ticks: u32) -> Self {
        Self {
            state: TrackingState::Untracked,
            generation: 0,
            missing_ticks: 0,
            release_after_missing_ticks,
        }
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    /// The tracked vehicle id, if any.
    pub fn tracked_id(&self) -> Option<&VehicleId> {
        match &self.state {
            TrackingState::Tracked(id) => Some(id),
            TrackingState::Untracked => None,
        }
    }

    /// Token for the current selection, if any.
    pub fn current_token(&self) -> Option<SelectionToken> {
        self.tracked_id()
            .map(|id| SelectionToken::new(self.generation, id.clone()))
    }

    /// Whether results tagged with `token` may still be applied.
    pub fn is_current(&self, token: &SelectionToken) -> bool {
        token.generation == self.generation && self.tracked_id() == Some(&token.vehicle_id)
    }

    /// Track `vehicle`, from any state.
    pub fn select(&mut self, vehicle: &VehiclePosition) -> Selection {
        let previous = match std::mem::take(&mut self.state) {
            TrackingState::Tracked(id) => Some(id),
            TrackingState::Untracked => None,
        };

        let mut batch = clear_trip_layers();
        batch.push(RenderOp::AddVehicle {
            layer: Layer::Tracked,
            vehicle: vehicle.clone(),
        });

        self.generation += 1;
        self.missing_ticks = 0;
        self.state = TrackingState::Tracked(vehicle.vehicle_id.clone());

        debug!(
            vehicle_id = %vehicle.vehicle_id,
            generation = self.generation,
            previous = ?previous,
            "Selection changed"
        );

        Selection {
            token: SelectionToken::new(self.generation, vehicle.vehicle_id.clone()),
            previous,
            batch,
        }
    }

    /// Release the tracked vehicle. `None` when nothing was tracked.
    pub fn deselect(&mut self) -> Option<Deselection> {
        let TrackingState::Tracked(vehicle_id) = std::mem::take(&mut self.state) else {
            return None;
        };

        self.generation += 1;
        self.missing_ticks = 0;

        debug!(
            vehicle_id = %vehicle_id,
            generation = self.generation,
            "Selection cleared"
        );

        Some(Deselection {
            vehicle_id,
            batch: clear_trip_layers(),
        })
    }

    /// Record whether the tracked vehicle appeared in a successful snapshot.
    ///
    /// Returns `true` when the vehicle has now been missing for the configured
    /// number of consecutive snapshots and should be released.
    pub fn observe_snapshot(&mut self, tracked_present: bool) -> bool {
        if self.tracked_id().is_none() {
            return false;
        }
        if tracked_present {
            self.missing_ticks = 0;
            return false;
        }

        self.missing_ticks += 1;
        self.release_after_missing_ticks > 0
            && self.missing_ticks >= self.release_after_missing_ticks
    }

    /// Consecutive snapshots the tracked vehicle has been missing from.
    pub fn missing_ticks(&self) -> u32 {
        self.missing_ticks
    }
}

fn clear_trip_layers() -> RenderBatch {
    [Layer::Tracked, Layer::TripShape, Layer::TripStops]
        .into_iter()
        .map(RenderOp::ClearLayer)
        .collect()
}
