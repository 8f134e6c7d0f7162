//! In-memory render surface.
//!
//! [`LayerStore`] applies render operations to a plain data model of the four
//! layers. It is the headless surface used by the CLI status view and by
//! tests asserting what a user would see.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::trace;

use super::{Layer, RenderBatch, RenderOp, RenderSink};
use crate::model::{VehicleId, VehiclePosition};
use crate::trip::{PathGeometry, TripDetails, TripStop};

/// Logical contents of one layer.
#[derive(Debug, Default, Clone)]
struct LayerContents {
    vehicles: BTreeMap<VehicleId, VehiclePosition>,
    paths: Vec<PathGeometry>,
    stops: Vec<TripStop>,
}

/// Render sink that keeps the visible state of every layer in memory.
#[derive(Debug, Default)]
pub struct LayerStore {
    layers: HashMap<Layer, LayerContents>,
    details: Option<TripDetails>,
    batches_applied: u64,
    ops_applied: u64,
    clears: HashMap<Layer, u64>,
}

impl LayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a single operation.
    pub fn apply_op(&mut self, op: RenderOp) {
        self.ops_applied += 1;
        trace!(layer = %op.layer(), ?op, "Applying render op");

        match op {
            RenderOp::AddVehicle { layer, vehicle } | RenderOp::UpdateVehicle { layer, vehicle } => {
                self.layer_mut(layer)
                    .vehicles
                    .insert(vehicle.vehicle_id.clone(), vehicle);
            }
            RenderOp::RemoveVehicle { layer, vehicle_id } => {
                self.layer_mut(layer).vehicles.remove(&vehicle_id);
            }
            RenderOp::ClearLayer(layer) => {
                self.layers.remove(&layer);
                if layer == Layer::Tracked {
                    self.details = None;
                }
                *self.clears.entry(layer).or_default() += 1;
            }
            RenderOp::DrawPath { layer, path } => {
                self.layer_mut(layer).paths.push(path);
            }
            RenderOp::AddStopMarker { layer, stop } => {
                self.layer_mut(layer).stops.push(stop);
            }
            RenderOp::ShowTripDetails(details) => {
                self.details = Some(details);
            }
        }
    }

    /// Ids of the vehicles currently shown on `layer`.
    pub fn vehicle_ids(&self, layer: Layer) -> BTreeSet<VehicleId> {
        self.layers
            .get(&layer)
            .map(|contents| contents.vehicles.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// A vehicle shown on `layer`.
    pub fn vehicle(&self, layer: Layer, vehicle_id: &VehicleId) -> Option<&VehiclePosition> {
        self.layers.get(&layer)?.vehicles.get(vehicle_id)
    }

    pub fn contains_vehicle(&self, layer: Layer, vehicle_id: &VehicleId) -> bool {
        self.vehicle(layer, vehicle_id).is_some()
    }

    pub fn vehicle_count(&self, layer: Layer) -> usize {
        self.layers
            .get(&layer)
            .map_or(0, |contents| contents.vehicles.len())
    }

    /// Paths drawn on `layer`, oldest first.
    pub fn paths(&self, layer: Layer) -> &[PathGeometry] {
        self.layers
            .get(&layer)
            .map(|contents| contents.paths.as_slice())
            .unwrap_or(&[])
    }

    /// Stop markers on `layer`, in the order they were added.
    pub fn stops(&self, layer: Layer) -> &[TripStop] {
        self.layers
            .get(&layer)
            .map(|contents| contents.stops.as_slice())
            .unwrap_or(&[])
    }

    /// Trip details currently shown.
    pub fn details(&self) -> Option<&TripDetails> {
        self.details.as_ref()
    }

    /// Whether `layer` shows nothing at all.
    pub fn is_layer_empty(&self, layer: Layer) -> bool {
        self.layers.get(&layer).map_or(true, |contents| {
            contents.vehicles.is_empty() && contents.paths.is_empty() && contents.stops.is_empty()
        })
    }

    /// How many times `layer` was cleared.
    pub fn clear_count(&self, layer: Layer) -> u64 {
        self.clears.get(&layer).copied().unwrap_or(0)
    }

    pub fn batches_applied(&self) -> u64 {
        self.batches_applied
    }

    pub fn ops_applied(&self) -> u64 {
        self.ops_applied
    }

    fn layer_mut(&mut self, layer: Layer) -> &mut LayerContents {
        self.layers.entry(layer).or_default()
    }
}

impl RenderSink for LayerStore {
    fn apply(&mut self, batch: RenderBatch) {
        for op in batch {
            self.apply_op(op);
        }
        self.batches_applied += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coordinates;

    fn vehicle(id: &str, lat: f64) -> VehiclePosition {
        VehiclePosition::new(id, "t", Coordinates::new(lat, 16.9))
    }

    #[test]
    fn test_add_update_remove_vehicle() {
        let mut store = LayerStore::new();
        store.apply_op(RenderOp::AddVehicle {
            layer: Layer::Pool,
            vehicle: vehicle("a", 52.0),
        });
        store.apply_op(RenderOp::UpdateVehicle {
            layer: Layer::Pool,
            vehicle: vehicle("a", 52.5),
        });

        let id = VehicleId::new("a");
        assert_eq!(
            store.vehicle(Layer::Pool, &id).unwrap().coordinates.latitude,
            52.5
        );

        store.apply_op(RenderOp::RemoveVehicle {
            layer: Layer::Pool,
            vehicle_id: id.clone(),
        });
        assert!(!store.contains_vehicle(Layer::Pool, &id));
        assert!(store.is_layer_empty(Layer::Pool));
    }

    #[test]
    fn test_clear_layer_counts_even_when_empty() {
        let mut store = LayerStore::new();
        store.apply(RenderBatch::from_iter([
            RenderOp::ClearLayer(Layer::TripShape),
            RenderOp::ClearLayer(Layer::TripShape),
        ]));

        assert_eq!(store.clear_count(Layer::TripShape), 2);
        assert_eq!(store.clear_count(Layer::TripStops), 0);
        assert_eq!(store.batches_applied(), 1);
        assert_eq!(store.ops_applied(), 2);
    }

    #[test]
    fn test_clearing_tracked_layer_hides_details() {
        let mut store = LayerStore::new();
        store.apply_op(RenderOp::ShowTripDetails(TripDetails {
            headsign: Some("Os. Sobieskiego".to_string()),
            ..Default::default()
        }));
        assert!(store.details().is_some());

        store.apply_op(RenderOp::ClearLayer(Layer::TripShape));
        assert!(store.details().is_some());

        store.apply_op(RenderOp::ClearLayer(Layer::Tracked));
        assert!(store.details().is_none());
    }

    #[test]
    fn test_layers_are_independent() {
        let mut store = LayerStore::new();
        store.apply_op(RenderOp::AddVehicle {
            layer: Layer::Tracked,
            vehicle: vehicle("a", 52.0),
        });
        store.apply_op(RenderOp::DrawPath {
            layer: Layer::TripShape,
            path: PathGeometry::new(vec![Coordinates::new(1.0, 2.0)]),
        });

        store.apply_op(RenderOp::ClearLayer(Layer::Pool));
        assert_eq!(store.vehicle_count(Layer::Tracked), 1);
        assert_eq!(store.paths(Layer::TripShape).len(), 1);
    }
}
