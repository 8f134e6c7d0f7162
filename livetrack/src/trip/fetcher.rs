//! Concurrent trip resource fetching.
//!
//! A selection issues three independent fetches (shape, stops, details).
//! Each runs in its own task, is bounded by the fetch timeout, and stops early
//! when the selection's cancellation token fires. Results are sent back to
//! the engine tagged with the [`SelectionToken`] that issued them; the engine
//! decides whether they are still wanted.
//!
//! ```text
//!              ┌──► trip_shape ───┐
//! select(v) ───┼──► trip_stops ───┼──► TripFetchResult ──► engine
//!              └──► trip_details ─┘
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{PathGeometry, ScheduledStop, TripDetails};
use crate::client::{with_timeout, TransitClient};
use crate::error::{FetchError, Resource};
use crate::tracking::SelectionToken;

/// One settled trip fetch.
#[derive(Debug, Clone)]
pub enum TripPart {
    Shape(Result<PathGeometry, FetchError>),
    Stops(Result<Vec<ScheduledStop>, FetchError>),
    Details(Result<TripDetails, FetchError>),
}

impl TripPart {
    pub fn resource(&self) -> Resource {
        match self {
            TripPart::Shape(_) => Resource::TripShape,
            TripPart::Stops(_) => Resource::TripStops,
            TripPart::Details(_) => Resource::TripDetails,
        }
    }
}

/// A trip fetch result tagged with the selection that requested it.
#[derive(Debug, Clone)]
pub struct TripFetchResult {
    pub token: SelectionToken,
    pub part: TripPart,
}

/// One of the three fetches issued for a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TripFetch {
    Shape,
    Stops,
    Details,
}

impl TripFetch {
    const ALL: [TripFetch; 3] = [TripFetch::Shape, TripFetch::Stops, TripFetch::Details];

    fn resource(self) -> Resource {
        match self {
            TripFetch::Shape => Resource::TripShape,
            TripFetch::Stops => Resource::TripStops,
            TripFetch::Details => Resource::TripDetails,
        }
    }

    async fn run(self, client: &dyn TransitClient, trip_id: &str, timeout: Duration) -> TripPart {
        let resource = self.resource();
        match self {
            TripFetch::Shape => {
                TripPart::Shape(with_timeout(resource, timeout, client.trip_shape(trip_id)).await)
            }
            TripFetch::Stops => {
                TripPart::Stops(with_timeout(resource, timeout, client.trip_stops(trip_id)).await)
            }
            TripFetch::Details => TripPart::Details(
                with_timeout(resource, timeout, client.trip_details(trip_id)).await,
            ),
        }
    }

    fn failed(self, error: FetchError) -> TripPart {
        match self {
            TripFetch::Shape => TripPart::Shape(Err(error)),
            TripFetch::Stops => TripPart::Stops(Err(error)),
            TripFetch::Details => TripPart::Details(Err(error)),
        }
    }
}

/// Spawns trip fetches for a selection.
#[derive(Clone)]
pub struct TripDetailFetcher {
    client: Arc<dyn TransitClient>,
    timeout: Duration,
    results: mpsc::Sender<TripFetchResult>,
}

impl TripDetailFetcher {
    pub fn new(
        client: Arc<dyn TransitClient>,
        timeout: Duration,
        results: mpsc::Sender<TripFetchResult>,
    ) -> Self {
        Self {
            client,
            timeout,
            results,
        }
    }

    /// Start the three fetches for `trip_id`.
    ///
    /// Returns the spawned task handles. Tasks end without sending anything
    /// once `cancel` fires. A fetch that panics is reported as a failed
    /// fetch, so every part is answered exactly once.
    pub fn fetch(
        &self,
        token: SelectionToken,
        trip_id: &str,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        debug!(
            vehicle_id = %token.vehicle_id(),
            generation = token.generation(),
            trip_id,
            "Fetching trip overlay"
        );

        TripFetch::ALL
            .iter()
            .map(|&kind| {
                let client = Arc::clone(&self.client);
                let results = self.results.clone();
                let token = token.clone();
                let trip_id = trip_id.to_string();
                let cancel = cancel.clone();
                let timeout = self.timeout;

                tokio::spawn(async move {
                    let resource = kind.resource();
                    let fetch = AssertUnwindSafe(kind.run(client.as_ref(), &trip_id, timeout))
                        .catch_unwind();
                    let part = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            trace!(%resource, "Trip fetch cancelled");
                            return;
                        }
                        outcome = fetch => match outcome {
                            Ok(part) => part,
                            Err(payload) => {
                                let message = panic_message(payload.as_ref());
                                warn!(
                                    %resource,
                                    trip_id = %trip_id,
                                    panic = %message,
                                    "Trip fetch panicked"
                                );
                                kind.failed(FetchError::Request(format!(
                                    "{resource} fetch panicked: {message}"
                                )))
                            }
                        },
                    };
                    if cancel.is_cancelled() {
                        return;
                    }
                    // The engine may have shut down; nothing to do then.
                    let _ = results.send(TripFetchResult { token, part }).await;
                })
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BoxFuture;
    use crate::model::{VehicleId, VehiclePosition};

    struct SlowShapeClient;

    impl TransitClient for SlowShapeClient {
        fn positions(&self) -> BoxFuture<'_, Result<Vec<VehiclePosition>, FetchError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn trip_shape(&self, _trip_id: &str) -> BoxFuture<'_, Result<PathGeometry, FetchError>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(PathGeometry::default())
            })
        }

        fn trip_stops(&self, trip_id: &str) -> BoxFuture<'_, Result<Vec<ScheduledStop>, FetchError>> {
            let trip_id = trip_id.to_string();
            Box::pin(async move { Ok(vec![ScheduledStop::new(1, trip_id)]) })
        }

        fn trip_details(&self, _trip_id: &str) -> BoxFuture<'_, Result<TripDetails, FetchError>> {
            Box::pin(async { Err(FetchError::Request("refused".to_string())) })
        }
    }

    struct PanickingDetailsClient;

    impl TransitClient for PanickingDetailsClient {
        fn positions(&self) -> BoxFuture<'_, Result<Vec<VehiclePosition>, FetchError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn trip_shape(&self, _trip_id: &str) -> BoxFuture<'_, Result<PathGeometry, FetchError>> {
            Box::pin(async { Ok(PathGeometry::default()) })
        }

        fn trip_stops(&self, _trip_id: &str) -> BoxFuture<'_, Result<Vec<ScheduledStop>, FetchError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn trip_details(&self, _trip_id: &str) -> BoxFuture<'_, Result<TripDetails, FetchError>> {
            Box::pin(async { panic!("details decoder blew up") })
        }
    }

    fn fetcher(timeout: Duration) -> (TripDetailFetcher, mpsc::Receiver<TripFetchResult>) {
        let (tx, rx) = mpsc::channel(8);
        (TripDetailFetcher::new(Arc::new(SlowShapeClient), timeout, tx), rx)
    }

    #[tokio::test]
    async fn test_fetch_sends_three_tagged_results() {
        let (fetcher, mut rx) = fetcher(Duration::from_millis(50));
        let token = SelectionToken::new(4, VehicleId::new("v"));

        let handles = fetcher.fetch(token.clone(), "trip-9", CancellationToken::new());
        for joined in futures::future::join_all(handles).await {
            joined.unwrap();
        }

        let mut resources = Vec::new();
        while let Ok(result) = rx.try_recv() {
            assert_eq!(result.token, token);
            match &result.part {
                TripPart::Shape(r) => assert!(matches!(r, Err(FetchError::Timeout { .. }))),
                TripPart::Stops(r) => assert_eq!(r.as_ref().unwrap()[0].name, "trip-9"),
                TripPart::Details(r) => assert!(r.is_err()),
            }
            resources.push(result.part.resource());
        }
        resources.sort();
        assert_eq!(resources, Resource::TRIP.to_vec());
    }

    #[tokio::test]
    async fn test_panicking_fetch_reports_failure() {
        let (tx, mut rx) = mpsc::channel(8);
        let fetcher =
            TripDetailFetcher::new(Arc::new(PanickingDetailsClient), Duration::from_secs(5), tx);
        let token = SelectionToken::new(2, VehicleId::new("v"));

        let handles = fetcher.fetch(token.clone(), "t", CancellationToken::new());
        for joined in futures::future::join_all(handles).await {
            assert!(joined.is_ok());
        }

        let mut parts = Vec::new();
        while let Ok(result) = rx.try_recv() {
            parts.push(result.part);
        }
        assert_eq!(parts.len(), 3);
        let details = parts
            .iter()
            .find_map(|part| match part {
                TripPart::Details(result) => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        match details {
            Err(FetchError::Request(message)) => {
                assert!(message.contains("details decoder blew up"), "{message}")
            }
            other => panic!("unexpected details result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_fetch_sends_nothing() {
        let (fetcher, mut rx) = fetcher(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let handles = fetcher.fetch(SelectionToken::new(1, VehicleId::new("v")), "t", cancel);
        futures::future::join_all(handles).await;
        assert!(rx.try_recv().is_err());
    }
}
