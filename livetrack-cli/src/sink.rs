//! Render sink for the terminal.
//!
//! There is no map in a terminal, so batches are applied to a shared
//! [`LayerStore`] that the watch command reads for its status lines, and
//! each batch is summarised in the log.

use std::sync::Arc;

use livetrack::{LayerStore, RenderBatch, RenderOp, RenderSink};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Applies batches to a shared [`LayerStore`] and logs what changed.
pub struct ConsoleSink {
    store: Arc<Mutex<LayerStore>>,
}

impl ConsoleSink {
    pub fn new(store: Arc<Mutex<LayerStore>>) -> Self {
        Self { store }
    }
}

impl RenderSink for ConsoleSink {
    fn apply(&mut self, batch: RenderBatch) {
        let summary = BatchSummary::of(&batch);
        for op in batch.iter() {
            match op {
                RenderOp::DrawPath { path, .. } => {
                    info!(points = path.len(), "Trip path drawn");
                }
                RenderOp::ShowTripDetails(details) => {
                    info!(
                        headsign = details.headsign.as_deref().unwrap_or("-"),
                        agency = details.agency_name.as_deref().unwrap_or("-"),
                        "Trip details"
                    );
                }
                _ => {}
            }
        }
        debug!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            cleared = summary.cleared,
            stops = summary.stops,
            "Render batch"
        );
        self.store.lock().apply(batch);
    }
}

/// Per-kind operation counts for one batch, across all layers.
#[derive(Debug, Default, PartialEq)]
struct BatchSummary {
    added: usize,
    updated: usize,
    removed: usize,
    cleared: usize,
    stops: usize,
}

impl BatchSummary {
    fn of(batch: &RenderBatch) -> Self {
        let mut summary = Self::default();
        for op in batch.iter() {
            match op {
                RenderOp::AddVehicle { .. } => summary.added += 1,
                RenderOp::UpdateVehicle { .. } => summary.updated += 1,
                RenderOp::RemoveVehicle { .. } => summary.removed += 1,
                RenderOp::ClearLayer(_) => summary.cleared += 1,
                RenderOp::AddStopMarker { .. } => summary.stops += 1,
                _ => {}
            }
        }
        summary
    }
}
