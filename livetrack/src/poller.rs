//! Periodic position polling.
//!
//! The poller fetches one snapshot immediately, then one per interval while
//! updates are enabled. Every outcome, success or failure, is forwarded to
//! the engine as a [`PollOutcome`]; the poller keeps no state of its own.
//! A slow fetch delays the next tick rather than overlapping it, so at most
//! one position request is in flight.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{with_timeout, TransitClient};
use crate::error::{FetchError, Resource};
use crate::model::VehiclePosition;

/// Result of one poll tick.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// Tick number, starting at 0 for the initial fetch.
    pub tick: u64,
    pub result: Result<Vec<VehiclePosition>, FetchError>,
    pub received_at: DateTime<Utc>,
}

/// Fetches position snapshots on a fixed interval.
pub struct PositionPoller {
    client: Arc<dyn TransitClient>,
    interval: Duration,
    updates_enabled: bool,
    timeout: Duration,
    outcomes: mpsc::Sender<PollOutcome>,
}

impl PositionPoller {
    pub fn new(
        client: Arc<dyn TransitClient>,
        interval: Duration,
        updates_enabled: bool,
        timeout: Duration,
        outcomes: mpsc::Sender<PollOutcome>,
    ) -> Self {
        Self {
            client,
            interval,
            updates_enabled,
            timeout,
            outcomes,
        }
    }

    /// Poll until `shutdown` fires or the receiver is dropped.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut tick = 0u64;
        if !self.poll_once(tick, &shutdown).await {
            return;
        }

        if !self.updates_enabled {
            info!("Position updates disabled; keeping initial snapshot");
            return;
        }

        let period = self.interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    tick += 1;
                    if !self.poll_once(tick, &shutdown).await {
                        break;
                    }
                }
            }
        }
        debug!(ticks = tick, "Position poller stopped");
    }

    /// Fetch and forward one snapshot. Returns false when polling should stop.
    async fn poll_once(&self, tick: u64, shutdown: &CancellationToken) -> bool {
        let fetch = with_timeout(Resource::Positions, self.timeout, self.client.positions());
        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return false,
            result = fetch => result,
        };

        let outcome = PollOutcome {
            tick,
            result,
            received_at: Utc::now(),
        };
        self.outcomes.send(outcome).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BoxFuture;
    use crate::model::Coordinates;
    use crate::trip::{PathGeometry, ScheduledStop, TripDetails};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingClient {
        calls: AtomicU64,
    }

    impl TransitClient for CountingClient {
        fn positions(&self) -> BoxFuture<'_, Result<Vec<VehiclePosition>, FetchError>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if call == 1 {
                    return Err(FetchError::Request("flaky".to_string()));
                }
                Ok(vec![VehiclePosition::new(
                    format!("v{}", call),
                    "trip",
                    Coordinates::new(0.0, 0.0),
                )])
            })
        }

        fn trip_shape(&self, _: &str) -> BoxFuture<'_, Result<PathGeometry, FetchError>> {
            Box::pin(async { Ok(PathGeometry::default()) })
        }

        fn trip_stops(&self, _: &str) -> BoxFuture<'_, Result<Vec<ScheduledStop>, FetchError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn trip_details(&self, _: &str) -> BoxFuture<'_, Result<TripDetails, FetchError>> {
            Box::pin(async { Ok(TripDetails::default()) })
        }
    }

    fn poller(updates: bool) -> (PositionPoller, mpsc::Receiver<PollOutcome>) {
        let (tx, rx) = mpsc::channel(16);
        let client = Arc::new(CountingClient {
            calls: AtomicU64::new(0),
        });
        let poller = PositionPoller::new(
            client,
            Duration::from_millis(10),
            updates,
            Duration::from_secs(1),
            tx,
        );
        (poller, rx)
    }

    #[tokio::test]
    async fn test_updates_disabled_fetches_once() {
        let (poller, mut rx) = poller(false);
        poller.run(CancellationToken::new()).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.tick, 0);
        assert!(first.result.is_ok());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_failures_are_forwarded_and_polling_continues() {
        let (poller, mut rx) = poller(true);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(poller.run(shutdown.clone()));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        shutdown.cancel();
        handle.await.unwrap();

        assert!(first.result.is_ok());
        assert_eq!(second.tick, 1);
        assert!(second.result.is_err());
        assert_eq!(third.tick, 2);
        assert_eq!(third.result.unwrap()[0].vehicle_id.as_str(), "v2");
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let (poller, rx) = poller(true);
        drop(rx);
        // Returns instead of polling forever.
        poller.run(CancellationToken::new()).await;
    }
}
