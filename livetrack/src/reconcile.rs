//! Vehicle pool reconciliation.
//!
//! Turns the previously rendered pool id set and a fresh snapshot into the
//! operations that bring the pool layer up to date. The tracked vehicle is
//! split off before diffing, so its id never appears in any pool operation.
//!
//! ```text
//! previous ids ─┐
//!               ├─► diff by vehicle_id ─► to_remove / to_update / to_add  (pool)
//! snapshot ─────┤
//!               └─► id == tracked ──────► tracked_entry                  (tracked)
//! ```
//!
//! Reconciliation is an incremental diff keyed by `vehicle_id`: ids present
//! before and now are updated in place, so marker identity (and any click
//! handler bound to it) is preserved across ticks.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{VehicleId, VehiclePosition};
use crate::render::{Layer, RenderBatch, RenderOp};

/// Pool operations for one tick, plus the tracked vehicle's fresh entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Vehicles new to the pool, sorted by id.
    pub to_add: Vec<VehiclePosition>,
    /// Vehicles already in the pool, sorted by id.
    pub to_update: Vec<VehiclePosition>,
    /// Pool vehicles absent from the snapshot, sorted.
    pub to_remove: Vec<VehicleId>,
    /// The tracked vehicle's entry in this snapshot, routed to the tracked layer.
    pub tracked_entry: Option<VehiclePosition>,
}

impl Reconciliation {
    /// Whether the pool layer is unaffected.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }

    /// The pool id set once these operations are applied.
    pub fn pool_ids(&self) -> BTreeSet<VehicleId> {
        self.to_update
            .iter()
            .chain(&self.to_add)
            .map(|vehicle| vehicle.vehicle_id.clone())
            .collect()
    }

    /// Render operations: removals, updates, additions, then the tracked marker.
    pub fn into_batch(self) -> RenderBatch {
        let mut batch = RenderBatch::new();
        batch.extend(self.to_remove.into_iter().map(|vehicle_id| RenderOp::RemoveVehicle {
            layer: Layer::Pool,
            vehicle_id,
        }));
        batch.extend(self.to_update.into_iter().map(|vehicle| RenderOp::UpdateVehicle {
            layer: Layer::Pool,
            vehicle,
        }));
        batch.extend(self.to_add.into_iter().map(|vehicle| RenderOp::AddVehicle {
            layer: Layer::Pool,
            vehicle,
        }));
        if let Some(vehicle) = self.tracked_entry {
            batch.push(RenderOp::UpdateVehicle {
                layer: Layer::Tracked,
                vehicle,
            });
        }
        batch
    }
}

/// Diff the rendered pool against a new snapshot.
///
/// If a snapshot lists the same id twice, the last entry wins. A tracked id
/// that is missing from the snapshot yields no `tracked_entry`; releasing the
/// selection is the state machine's decision, not this function's.
pub fn reconcile(
    previous: &BTreeSet<VehicleId>,
    snapshot: &[VehiclePosition],
    tracked: Option<&VehicleId>,
) -> Reconciliation {
    let mut tracked_entry = None;
    let mut pool: BTreeMap<&VehicleId, &VehiclePosition> = BTreeMap::new();

    for vehicle in snapshot {
        if Some(&vehicle.vehicle_id) == tracked {
            tracked_entry = Some(vehicle.clone());
        } else {
            pool.insert(&vehicle.vehicle_id, vehicle);
        }
    }

    let to_remove = previous
        .iter()
        .filter(|id| Some(*id) != tracked && !pool.contains_key(id))
        .cloned()
        .collect();

    let (to_update, to_add): (Vec<_>, Vec<_>) = pool
        .into_values()
        .cloned()
        .partition(|vehicle| previous.contains(&vehicle.vehicle_id));

    Reconciliation {
        to_add,
        to_update,
        to_remove,
        tracked_entry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coordinates;
    use proptest::prelude::*;

    fn vehicle(id: &str) -> VehiclePosition {
        VehiclePosition::new(id, format!("trip-{}", id), Coordinates::new(52.4, 16.9))
    }

    fn ids(items: &[&str]) -> BTreeSet<VehicleId> {
        items.iter().map(|id| VehicleId::new(*id)).collect()
    }

    fn id_list(vehicles: &[VehiclePosition]) -> Vec<&str> {
        vehicles.iter().map(|v| v.vehicle_id.as_str()).collect()
    }

    #[test]
    fn test_first_snapshot_adds_everything() {
        let snapshot = vec![vehicle("b"), vehicle("a")];
        let result = reconcile(&BTreeSet::new(), &snapshot, None);

        assert_eq!(id_list(&result.to_add), vec!["a", "b"]);
        assert!(result.to_update.is_empty());
        assert!(result.to_remove.is_empty());
        assert_eq!(result.pool_ids(), ids(&["a", "b"]));
    }

    #[test]
    fn test_diff_splits_add_update_remove() {
        let previous = ids(&["a", "b", "c"]);
        let snapshot = vec![vehicle("b"), vehicle("c"), vehicle("d")];
        let result = reconcile(&previous, &snapshot, None);

        assert_eq!(id_list(&result.to_add), vec!["d"]);
        assert_eq!(id_list(&result.to_update), vec!["b", "c"]);
        assert_eq!(result.to_remove, vec![VehicleId::new("a")]);
        assert_eq!(result.pool_ids(), ids(&["b", "c", "d"]));
    }

    #[test]
    fn test_empty_snapshot_removes_all_previous() {
        let previous = ids(&["a", "b"]);
        let result = reconcile(&previous, &[], None);

        assert!(result.to_add.is_empty());
        assert!(result.to_update.is_empty());
        assert_eq!(result.to_remove, vec![VehicleId::new("a"), VehicleId::new("b")]);
        assert!(result.pool_ids().is_empty());
    }

    #[test]
    fn test_tracked_vehicle_routed_to_tracked_entry() {
        let previous = ids(&["a"]);
        let snapshot = vec![vehicle("a"), vehicle("t")];
        let tracked = VehicleId::new("t");
        let result = reconcile(&previous, &snapshot, Some(&tracked));

        assert_eq!(
            result.tracked_entry.as_ref().map(|v| v.vehicle_id.as_str()),
            Some("t")
        );
        assert!(!result.pool_ids().contains(&tracked));
    }

    #[test]
    fn test_tracked_vehicle_absent_from_snapshot() {
        let tracked = VehicleId::new("t");
        let result = reconcile(&ids(&["a"]), &[vehicle("a")], Some(&tracked));

        assert!(result.tracked_entry.is_none());
        assert_eq!(id_list(&result.to_update), vec!["a"]);
        assert!(result.to_remove.is_empty());
    }

    #[test]
    fn test_tracked_id_never_removed_from_pool_even_if_listed() {
        let previous = ids(&["a", "t"]);
        let tracked = VehicleId::new("t");
        let result = reconcile(&previous, &[], Some(&tracked));

        assert_eq!(result.to_remove, vec![VehicleId::new("a")]);
    }

    #[test]
    fn test_duplicate_ids_last_entry_wins() {
        let mut first = vehicle("a");
        first.coordinates = Coordinates::new(1.0, 1.0);
        let mut second = vehicle("a");
        second.coordinates = Coordinates::new(2.0, 2.0);

        let result = reconcile(&BTreeSet::new(), &[first, second], None);
        assert_eq!(result.to_add.len(), 1);
        assert_eq!(result.to_add[0].coordinates, Coordinates::new(2.0, 2.0));
    }

    #[test]
    fn test_batch_order_is_remove_update_add_tracked() {
        let previous = ids(&["a", "b"]);
        let tracked = VehicleId::new("t");
        let snapshot = vec![vehicle("b"), vehicle("c"), vehicle("t")];
        let batch = reconcile(&previous, &snapshot, Some(&tracked)).into_batch();

        let ops = batch.ops();
        assert!(matches!(&ops[0], RenderOp::RemoveVehicle { layer: Layer::Pool, vehicle_id } if vehicle_id.as_str() == "a"));
        assert!(matches!(&ops[1], RenderOp::UpdateVehicle { layer: Layer::Pool, .. }));
        assert!(matches!(&ops[2], RenderOp::AddVehicle { layer: Layer::Pool, .. }));
        assert!(matches!(&ops[3], RenderOp::UpdateVehicle { layer: Layer::Tracked, .. }));
        assert_eq!(ops.len(), 4);
    }

    proptest! {
        #[test]
        fn prop_tracked_id_never_in_pool_ops(
            previous in proptest::collection::btree_set(0u8..20, 0..12),
            snapshot in proptest::collection::vec(0u8..20, 0..20),
            tracked in 0u8..20,
        ) {
            let previous: BTreeSet<VehicleId> =
                previous.iter().map(|n| VehicleId::new(n.to_string())).collect();
            let snapshot: Vec<VehiclePosition> =
                snapshot.iter().map(|n| vehicle(&n.to_string())).collect();
            let tracked = VehicleId::new(tracked.to_string());

            let result = reconcile(&previous, &snapshot, Some(&tracked));

            prop_assert!(!result.to_add.iter().any(|v| v.vehicle_id == tracked));
            prop_assert!(!result.to_update.iter().any(|v| v.vehicle_id == tracked));
            prop_assert!(!result.to_remove.contains(&tracked));
            prop_assert!(!result.pool_ids().contains(&tracked));
        }
    }
}
