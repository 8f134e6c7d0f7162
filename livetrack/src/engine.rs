//! The tracking engine: single owner of all tracking state.
//!
//! Poll outcomes, user commands and trip fetch results arrive on channels and
//! are handled one at a time by [`TrackingEngine::run`]. Each event produces
//! at most one [`RenderBatch`], applied to the sink before the next event is
//! looked at, so two events' operations never interleave.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  PollOutcome      ┌─────────────────────────────────┐
//! │ PositionPoller │ ────────────────► │          TrackingEngine         │
//! └────────────────┘                   │                                 │
//! ┌────────────────┐  EngineCommand    │  reconcile ─► pool layer        │  RenderBatch
//! │  EngineHandle  │ ────────────────► │  TrackingStateMachine           │ ─────────────► RenderSink
//! └────────────────┘                   │  TripOverlay (per selection)    │
//! ┌────────────────┐  TripFetchResult  │                                 │  Notification
//! │TripDetailFetch │ ────────────────► │                                 │ ─────────────► subscribers
//! └────────────────┘                   └─────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use livetrack::{ClientConfig, HttpTransitClient, LayerStore, TrackerConfig, TrackingEngine};
//!
//! let client = Arc::new(HttpTransitClient::new(&ClientConfig::default())?);
//! let (engine, handle) = TrackingEngine::new(TrackerConfig::default(), client, LayerStore::new());
//!
//! let shutdown = CancellationToken::new();
//! let mut notifications = handle.subscribe();
//! tokio::spawn(engine.run(shutdown.clone()));
//!
//! handle.select("1042").await?;
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::TransitClient;
use crate::config::TrackerConfig;
use crate::error::{EngineClosed, Resource, TrackingError};
use crate::model::{VehicleId, VehiclePosition};
use crate::notification::Notification;
use crate::poller::{PollOutcome, PositionPoller};
use crate::reconcile::reconcile;
use crate::render::{Layer, RenderBatch, RenderOp, RenderSink};
use crate::tracking::{DeselectReason, TrackingStateMachine};
use crate::trip::{TripDetailFetcher, TripFetchResult, TripOverlay, TripPart};

// =============================================================================
// Handle
// =============================================================================

/// A user-originated event for the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Select(VehicleId),
    Deselect(DeselectReason),
}

/// Cloneable handle for driving a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    notifications: broadcast::Sender<Notification>,
}

impl EngineHandle {
    /// Track a vehicle from the latest snapshot.
    pub async fn select(&self, vehicle_id: impl Into<VehicleId>) -> Result<(), EngineClosed> {
        self.send(EngineCommand::Select(vehicle_id.into())).await
    }

    /// Release the tracked vehicle, if any.
    pub async fn deselect(&self, reason: DeselectReason) -> Result<(), EngineClosed> {
        self.send(EngineCommand::Deselect(reason)).await
    }

    /// Receive engine notifications from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    async fn send(&self, command: EngineCommand) -> Result<(), EngineClosed> {
        self.commands.send(command).await.map_err(|_| EngineClosed)
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Owns the tracked selection, the rendered pool and the trip overlay.
pub struct TrackingEngine<S: RenderSink> {
    config: TrackerConfig,
    client: Arc<dyn TransitClient>,
    state: EngineState<S>,
    commands_rx: mpsc::Receiver<EngineCommand>,
    trip_rx: mpsc::Receiver<TripFetchResult>,
}

impl<S: RenderSink + 'static> TrackingEngine<S> {
    /// Create an engine and the handle used to drive it.
    ///
    /// Nothing is fetched until [`run`](Self::run) is awaited.
    pub fn new(
        config: TrackerConfig,
        client: Arc<dyn TransitClient>,
        sink: S,
    ) -> (Self, EngineHandle) {
        let capacity = config.event_channel_capacity.max(1);
        let (commands_tx, commands_rx) = mpsc::channel(capacity);
        let (trip_tx, trip_rx) = mpsc::channel(capacity);
        let (notifications, _) = broadcast::channel(capacity);

        let fetcher = TripDetailFetcher::new(Arc::clone(&client), config.fetch_timeout, trip_tx);
        let state = EngineState {
            sink,
            tracking: TrackingStateMachine::new(config.release_after_missing_ticks),
            fetcher,
            pool_ids: BTreeSet::new(),
            latest: HashMap::new(),
            overlay: None,
            selection_cancel: None,
            notifications: notifications.clone(),
        };

        let engine = Self {
            config,
            client,
            state,
            commands_rx,
            trip_rx,
        };
        let handle = EngineHandle {
            commands: commands_tx,
            notifications,
        };
        (engine, handle)
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Spawns the position poller and processes events in arrival order.
    /// Shutdown has priority over pending events.
    pub async fn run(self, shutdown: CancellationToken) {
        let Self {
            config,
            client,
            mut state,
            mut commands_rx,
            mut trip_rx,
        } = self;

        info!(
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            updates_enabled = config.updates_enabled,
            "Tracking engine starting"
        );

        let (poll_tx, mut poll_rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let poller = PositionPoller::new(
            client,
            config.poll_interval,
            config.updates_enabled,
            config.fetch_timeout,
            poll_tx,
        );
        let poller_shutdown = shutdown.child_token();
        let poller_handle = tokio::spawn(poller.run(poller_shutdown.clone()));

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Tracking engine shutting down");
                    break;
                }

                Some(command) = commands_rx.recv() => {
                    state.handle_command(command);
                }

                Some(result) = trip_rx.recv() => {
                    state.apply_trip_result(result);
                }

                Some(outcome) = poll_rx.recv() => {
                    state.apply_poll(outcome);
                }
            }
        }

        state.cancel_trip_fetch();
        poller_shutdown.cancel();
        let _ = poller_handle.await;
        info!("Tracking engine stopped");
    }
}

// =============================================================================
// State
// =============================================================================

/// Everything the engine mutates; touched only by the owner loop.
struct EngineState<S> {
    sink: S,
    tracking: TrackingStateMachine,
    fetcher: TripDetailFetcher,
    /// Ids currently rendered on the pool layer.
    pool_ids: BTreeSet<VehicleId>,
    /// Latest successful snapshot, by id.
    latest: HashMap<VehicleId, VehiclePosition>,
    overlay: Option<TripOverlay>,
    selection_cancel: Option<CancellationToken>,
    notifications: broadcast::Sender<Notification>,
}

impl<S: RenderSink> EngineState<S> {
    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Select(vehicle_id) => self.select(vehicle_id),
            EngineCommand::Deselect(reason) => {
                if let Some(release) = self.release(reason) {
                    self.sink.apply(release.batch);
                    self.notify(release.notification);
                }
            }
        }
    }

    fn apply_poll(&mut self, outcome: PollOutcome) {
        let PollOutcome { tick, result, .. } = outcome;
        let positions = match result {
            Ok(positions) => positions,
            Err(error) => {
                warn!(tick, error = %error, "Position poll failed; keeping rendered state");
                self.notify(Notification::Error(TrackingError::Transient {
                    resource: Resource::Positions,
                    source: error,
                }));
                return;
            }
        };

        let tracked = self.tracking.tracked_id().cloned();
        let reconciliation = reconcile(&self.pool_ids, &positions, tracked.as_ref());
        let tracked_present = reconciliation.tracked_entry.is_some();

        debug!(
            tick,
            added = reconciliation.to_add.len(),
            updated = reconciliation.to_update.len(),
            removed = reconciliation.to_remove.len(),
            tracked_present,
            "Reconciled snapshot"
        );

        self.pool_ids = reconciliation.pool_ids();
        self.latest = positions
            .into_iter()
            .map(|vehicle| (vehicle.vehicle_id.clone(), vehicle))
            .collect();

        let mut batch = reconciliation.into_batch();
        let mut released = None;
        if self.tracking.observe_snapshot(tracked_present) {
            released = self.release(DeselectReason::VehicleLost);
        }
        if let Some(release) = &mut released {
            batch.append(std::mem::take(&mut release.batch));
        }

        if !batch.is_empty() {
            self.sink.apply(batch);
        }
        if let Some(release) = released {
            self.notify(release.notification);
        }
        self.notify(Notification::SnapshotApplied {
            tick,
            vehicles: self.latest.len(),
        });
    }

    fn select(&mut self, vehicle_id: VehicleId) {
        let Some(vehicle) = self.latest.get(&vehicle_id).cloned() else {
            warn!(vehicle_id = %vehicle_id, "Ignoring selection of unknown vehicle");
            return;
        };

        self.cancel_trip_fetch();

        let mut batch = RenderBatch::new();
        if self.pool_ids.remove(&vehicle_id) {
            batch.push(RenderOp::RemoveVehicle {
                layer: Layer::Pool,
                vehicle_id: vehicle_id.clone(),
            });
        }

        let selection = self.tracking.select(&vehicle);
        batch.append(selection.batch);

        if let Some(previous) = selection.previous.filter(|previous| *previous != vehicle_id) {
            if let Some(position) = self.latest.get(&previous) {
                self.pool_ids.insert(previous);
                batch.push(RenderOp::AddVehicle {
                    layer: Layer::Pool,
                    vehicle: position.clone(),
                });
            }
        }

        self.sink.apply(batch);

        info!(
            vehicle_id = %vehicle_id,
            trip_id = %vehicle.trip_id,
            generation = selection.token.generation(),
            "Tracking vehicle"
        );

        self.overlay = Some(TripOverlay::new(
            selection.token.clone(),
            vehicle.trip_id.clone(),
            vehicle.current_stop_sequence,
        ));

        if vehicle.trip_id.is_empty() {
            debug!(vehicle_id = %vehicle_id, "Vehicle has no trip; skipping trip overlay");
        } else {
            let cancel = CancellationToken::new();
            self.fetcher
                .fetch(selection.token, &vehicle.trip_id, cancel.clone());
            self.selection_cancel = Some(cancel);
        }

        self.notify(Notification::TrackingStarted {
            vehicle_id,
            trip_id: vehicle.trip_id,
        });
    }

    /// Deselect and build the batch that clears the overlays and returns the
    /// vehicle to the pool. The caller applies the batch.
    fn release(&mut self, reason: DeselectReason) -> Option<Release> {
        let Some(deselection) = self.tracking.deselect() else {
            debug!(%reason, "Deselect with nothing tracked");
            return None;
        };

        self.cancel_trip_fetch();
        self.overlay = None;

        let vehicle_id = deselection.vehicle_id;
        let mut batch = deselection.batch;
        if let Some(position) = self.latest.get(&vehicle_id) {
            if self.pool_ids.insert(vehicle_id.clone()) {
                batch.push(RenderOp::AddVehicle {
                    layer: Layer::Pool,
                    vehicle: position.clone(),
                });
            }
        }

        info!(vehicle_id = %vehicle_id, %reason, "Released tracked vehicle");
        Some(Release {
            batch,
            notification: Notification::TrackingReleased { vehicle_id, reason },
        })
    }

    fn apply_trip_result(&mut self, result: TripFetchResult) {
        let TripFetchResult { token, part } = result;
        if !self.tracking.is_current(&token) {
            debug!(
                vehicle_id = %token.vehicle_id(),
                generation = token.generation(),
                resource = %part.resource(),
                "Discarding stale trip result"
            );
            return;
        }
        let Some(overlay) = self.overlay.as_mut().filter(|o| o.token() == &token) else {
            return;
        };

        let resource = part.resource();
        let mut batch = RenderBatch::new();
        match part {
            TripPart::Shape(Ok(path)) => {
                if !path.is_empty() {
                    batch.push(RenderOp::DrawPath {
                        layer: Layer::TripShape,
                        path: path.clone(),
                    });
                }
                overlay.set_path(path);
            }
            TripPart::Stops(Ok(stops)) => {
                let stops = overlay.set_stops(stops);
                batch.extend(stops.iter().cloned().map(|stop| RenderOp::AddStopMarker {
                    layer: Layer::TripStops,
                    stop,
                }));
            }
            TripPart::Details(Ok(details)) => {
                batch.push(RenderOp::ShowTripDetails(details.clone()));
                overlay.set_details(details);
            }
            TripPart::Shape(Err(error))
            | TripPart::Stops(Err(error))
            | TripPart::Details(Err(error)) => {
                warn!(
                    vehicle_id = %token.vehicle_id(),
                    %resource,
                    error = %error,
                    "Trip fetch failed"
                );
                overlay.record_failure(resource, error);
            }
        }
        let report = overlay.take_failure_report();

        if !batch.is_empty() {
            self.sink.apply(batch);
        }
        if let Some(error) = report {
            self.notify(Notification::Error(error));
        }
    }

    fn cancel_trip_fetch(&mut self) {
        if let Some(cancel) = self.selection_cancel.take() {
            cancel.cancel();
        }
    }

    fn notify(&self, notification: Notification) {
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }
}

/// A completed deselection awaiting application.
struct Release {
    batch: RenderBatch,
    notification: Notification,
}
