//! Watch command - run the tracking engine against a transit server.
//!
//! Positions are polled and reconciled into an in-memory layer store; status
//! lines are printed for every notification. With `--track`, the given
//! vehicle is selected as soon as it appears in a snapshot, and selected
//! again if it is lost and later comes back.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use livetrack::config::ConfigFile;
use livetrack::{
    DeselectReason, EngineHandle, HttpTransitClient, Layer, LayerStore, Notification,
    TrackerConfig, TrackingEngine, TransitClient, VehicleId,
};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::CliError;
use crate::sink::ConsoleSink;

/// Arguments for the watch command.
#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    /// Transit server URL (overrides server.base_url)
    #[arg(long)]
    pub url: Option<String>,

    /// Poll interval in milliseconds (overrides tracking.poll_interval_ms)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Fetch positions once and never refresh
    #[arg(long)]
    pub no_updates: bool,

    /// Vehicle id to track once it appears
    #[arg(long, value_name = "VEHICLE_ID")]
    pub track: Option<String>,
}

impl WatchArgs {
    /// Apply command-line overrides on top of the config file.
    fn tracker_config(&self, config: &ConfigFile) -> Result<TrackerConfig, CliError> {
        let mut tracker = config.tracker_config();
        if let Some(ms) = self.interval_ms {
            if ms == 0 {
                return Err(CliError::Config("--interval-ms must be positive".to_string()));
            }
            tracker = tracker.with_poll_interval(Duration::from_millis(ms));
        }
        if self.no_updates {
            tracker = tracker.with_updates_enabled(false);
        }
        Ok(tracker)
    }
}

/// Run the watch command until Ctrl+C.
pub fn run(args: WatchArgs, config: &ConfigFile) -> Result<(), CliError> {
    let tracker_config = args.tracker_config(config)?;
    let mut client_config = config.client_config();
    if let Some(url) = &args.url {
        client_config.base_url = url.clone();
    }
    let client = HttpTransitClient::new(&client_config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping...");
        signal_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    println!("Watching {}", client.base_url());
    println!(
        "  Poll interval: {} ms{}",
        tracker_config.poll_interval.as_millis(),
        if tracker_config.updates_enabled { "" } else { " (updates disabled)" }
    );
    if let Some(id) = &args.track {
        println!("  Tracking:      {}", id);
    }
    println!();
    println!("Press Ctrl+C to exit");
    println!();

    let target = args.track.map(VehicleId::from);
    runtime.block_on(watch(tracker_config, Arc::new(client), target, shutdown));
    Ok(())
}

async fn watch(
    config: TrackerConfig,
    client: Arc<dyn TransitClient>,
    target: Option<VehicleId>,
    shutdown: CancellationToken,
) {
    let store = Arc::new(Mutex::new(LayerStore::new()));
    let (engine, handle) = TrackingEngine::new(config, client, ConsoleSink::new(Arc::clone(&store)));
    let mut notifications = handle.subscribe();
    let engine_task = tokio::spawn(engine.run(shutdown.clone()));

    let mut follower = Follower::new(target);
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            received = notifications.recv() => match received {
                Ok(notification) => {
                    print_status(&notification, &store);
                    if follower.observe(&notification, &store.lock()) {
                        follow(&handle, &mut follower).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification subscriber fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    let _ = engine_task.await;
}

async fn follow(handle: &EngineHandle, follower: &mut Follower) {
    if let Some(id) = follower.target.clone() {
        if handle.select(id).await.is_ok() {
            follower.requested = true;
        }
    }
}

/// Decides when the `--track` vehicle should be selected.
#[derive(Debug)]
struct Follower {
    target: Option<VehicleId>,
    /// A selection was requested and has not been released since.
    requested: bool,
}

impl Follower {
    fn new(target: Option<VehicleId>) -> Self {
        Self {
            target,
            requested: false,
        }
    }

    /// Returns true when the target should be selected now.
    fn observe(&mut self, notification: &Notification, store: &LayerStore) -> bool {
        let Some(target) = self.target.clone() else {
            return false;
        };
        match notification {
            Notification::TrackingReleased { vehicle_id, reason } if *vehicle_id == target => {
                // Only re-follow a vehicle the engine dropped, not one the
                // user let go of.
                self.requested = false;
                if *reason != DeselectReason::VehicleLost {
                    self.target = None;
                }
                false
            }
            Notification::SnapshotApplied { .. } => {
                !self.requested && store.contains_vehicle(Layer::Pool, &target)
            }
            _ => false,
        }
    }
}

fn print_status(notification: &Notification, store: &Arc<Mutex<LayerStore>>) {
    match notification {
        Notification::SnapshotApplied { tick, vehicles } => {
            let store = store.lock();
            let tracked: Vec<String> = store
                .vehicle_ids(Layer::Tracked)
                .into_iter()
                .map(|id| id.to_string())
                .collect();
            println!(
                "[tick {}] {} vehicles ({} in pool){}",
                tick,
                vehicles,
                store.vehicle_count(Layer::Pool),
                if tracked.is_empty() {
                    String::new()
                } else {
                    format!(" | tracking {}", tracked.join(", "))
                }
            );
        }
        other => println!("{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livetrack::{Coordinates, RenderOp, RenderSink, VehiclePosition};

    fn store_with_pool(ids: &[&str]) -> LayerStore {
        let mut store = LayerStore::new();
        store.apply(
            ids.iter()
                .map(|id| RenderOp::AddVehicle {
                    layer: Layer::Pool,
                    vehicle: VehiclePosition::new(*id, "t", Coordinates::new(0.0, 0.0)),
                })
                .collect(),
        );
        store
    }

    fn snapshot() -> Notification {
        Notification::SnapshotApplied {
            tick: 0,
            vehicles: 1,
        }
    }

    #[test]
    fn test_follower_selects_once_target_appears() {
        let mut follower = Follower::new(Some(VehicleId::new("42")));
        assert!(!follower.observe(&snapshot(), &store_with_pool(&["1"])));
        assert!(follower.observe(&snapshot(), &store_with_pool(&["1", "42"])));
    }

    #[test]
    fn test_follower_rearms_after_vehicle_lost_only() {
        let mut follower = Follower::new(Some(VehicleId::new("42")));
        follower.requested = true;
        let store = store_with_pool(&["42"]);
        assert!(!follower.observe(&snapshot(), &store));

        let lost = Notification::TrackingReleased {
            vehicle_id: VehicleId::new("42"),
            reason: DeselectReason::VehicleLost,
        };
        assert!(!follower.observe(&lost, &store));
        assert!(follower.observe(&snapshot(), &store));

        follower.requested = true;
        let closed = Notification::TrackingReleased {
            vehicle_id: VehicleId::new("42"),
            reason: DeselectReason::Untrack,
        };
        follower.observe(&closed, &store);
        assert!(!follower.observe(&snapshot(), &store));
    }

    #[test]
    fn test_interval_override_must_be_positive() {
        let args = WatchArgs {
            url: None,
            interval_ms: Some(0),
            no_updates: false,
            track: None,
        };
        assert!(args.tracker_config(&ConfigFile::default()).is_err());

        let args = WatchArgs {
            interval_ms: Some(250),
            no_updates: true,
            ..args
        };
        let config = args.tracker_config(&ConfigFile::default()).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert!(!config.updates_enabled);
    }
}
