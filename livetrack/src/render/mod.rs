//! Render operations and the sink that consumes them.
//!
//! The core never draws anything. It produces [`RenderOp`]s grouped into
//! [`RenderBatch`]es, one batch per event, and hands each batch to a
//! [`RenderSink`]. A sink must apply a batch completely before the next one
//! arrives, so two events' operations never interleave.
//!
//! # Layers
//!
//! ```text
//! pool       every vehicle except the tracked one
//! tracked    the tracked vehicle's marker and its trip details
//! tripShape  the tracked trip's path
//! tripStops  the tracked trip's stop markers
//! ```

mod store;

pub use store::LayerStore;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::model::{VehicleId, VehiclePosition};
use crate::trip::{PathGeometry, TripDetails, TripStop};

/// A named layer on the render surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    Pool,
    Tracked,
    TripShape,
    TripStops,
}

impl Layer {
    /// All layers.
    pub const ALL: [Layer; 4] = [Layer::Pool, Layer::Tracked, Layer::TripShape, Layer::TripStops];

    /// Layer name as exposed to the render surface.
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Pool => "pool",
            Layer::Tracked => "tracked",
            Layer::TripShape => "tripShape",
            Layer::TripStops => "tripStops",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single logical render operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOp {
    /// Add a vehicle marker keyed by its id.
    AddVehicle {
        layer: Layer,
        vehicle: VehiclePosition,
    },
    /// Move or relabel an existing vehicle marker.
    UpdateVehicle {
        layer: Layer,
        vehicle: VehiclePosition,
    },
    /// Remove a vehicle marker.
    RemoveVehicle { layer: Layer, vehicle_id: VehicleId },
    /// Remove everything from a layer.
    ClearLayer(Layer),
    /// Draw a path.
    DrawPath { layer: Layer, path: PathGeometry },
    /// Add a stop marker.
    AddStopMarker { layer: Layer, stop: TripStop },
    /// Show trip metadata next to the tracked marker (cleared with [`Layer::Tracked`]).
    ShowTripDetails(TripDetails),
}

impl RenderOp {
    /// The layer this operation touches.
    pub fn layer(&self) -> Layer {
        match self {
            RenderOp::AddVehicle { layer, .. }
            | RenderOp::UpdateVehicle { layer, .. }
            | RenderOp::RemoveVehicle { layer, .. }
            | RenderOp::DrawPath { layer, .. }
            | RenderOp::AddStopMarker { layer, .. } => *layer,
            RenderOp::ClearLayer(layer) => *layer,
            RenderOp::ShowTripDetails(_) => Layer::Tracked,
        }
    }
}

/// Operations derived from one event, applied as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderBatch {
    ops: Vec<RenderOp>,
}

impl RenderBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: RenderOp) {
        self.ops.push(op);
    }

    /// Append another batch's operations.
    pub fn append(&mut self, other: RenderBatch) {
        self.ops.extend(other.ops);
    }

    pub fn ops(&self) -> &[RenderOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RenderOp> {
        self.ops.iter()
    }
}

impl FromIterator<RenderOp> for RenderBatch {
    fn from_iter<I: IntoIterator<Item = RenderOp>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl Extend<RenderOp> for RenderBatch {
    fn extend<I: IntoIterator<Item = RenderOp>>(&mut self, iter: I) {
        self.ops.extend(iter);
    }
}

impl IntoIterator for RenderBatch {
    type Item = RenderOp;
    type IntoIter = std::vec::IntoIter<RenderOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// Consumer of render batches (the visual surface).
pub trait RenderSink: Send {
    /// Apply every operation in `batch`, in order, before returning.
    fn apply(&mut self, batch: RenderBatch);
}

impl<S: RenderSink + ?Sized> RenderSink for Box<S> {
    fn apply(&mut self, batch: RenderBatch) {
        (**self).apply(batch);
    }
}

/// Shared sinks let callers inspect the surface while the engine owns a handle.
impl<S: RenderSink> RenderSink for Arc<Mutex<S>> {
    fn apply(&mut self, batch: RenderBatch) {
        self.lock().apply(batch);
    }
}
