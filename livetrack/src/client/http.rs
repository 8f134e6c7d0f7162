//! HTTP implementation of [`TransitClient`] using reqwest.
//!
//! Position snapshots are never cached. Trip resources change rarely, so
//! shapes, stops and details sit in per-resource moka caches keyed by trip
//! id. Concurrent requests for the same trip share one in-flight fetch.

use std::sync::Arc;

use moka::future::Cache as MokaCache;
use reqwest::Url;
use tracing::{debug, trace};

use super::{wire, BoxFuture, TransitClient};
use crate::config::ClientConfig;
use crate::error::FetchError;
use crate::model::VehiclePosition;
use crate::trip::{PathGeometry, ScheduledStop, TripDetails};

/// Transit server client over HTTP.
pub struct HttpTransitClient {
    client: reqwest::Client,
    base_url: Url,
    shapes: MokaCache<String, PathGeometry>,
    stops: MokaCache<String, Vec<ScheduledStop>>,
    details: MokaCache<String, TripDetails>,
}

impl HttpTransitClient {
    /// Create a client from configuration.
    ///
    /// Fails when the base URL cannot be parsed or cannot carry a path.
    pub fn new(config: &ClientConfig) -> Result<Self, FetchError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| FetchError::Request(format!("Invalid base URL '{}': {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::Request(format!(
                "Invalid base URL '{}': cannot carry a path",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            shapes: trip_cache(config),
            stops: trip_cache(config),
            details: trip_cache(config),
        })
    }

    /// The server root this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `/api/positions?routes_info&bearings`
    pub fn positions_url(&self) -> Url {
        let mut url = self.endpoint(&["api", "positions"]);
        url.set_query(Some("routes_info&bearings"));
        url
    }

    /// `/api/trips/{trip_id}/shape?geojson`
    pub fn shape_url(&self, trip_id: &str) -> Url {
        let mut url = self.endpoint(&["api", "trips", trip_id, "shape"]);
        url.set_query(Some("geojson"));
        url
    }

    /// `/api/trips/{trip_id}/stops`
    pub fn stops_url(&self, trip_id: &str) -> Url {
        self.endpoint(&["api", "trips", trip_id, "stops"])
    }

    /// `/api/trips/{trip_id}`
    pub fn details_url(&self, trip_id: &str) -> Url {
        self.endpoint(&["api", "trips", trip_id])
    }

    /// Append percent-encoded segments to the base URL's path.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_bytes(&self, url: Url) -> Result<bytes::Bytes, FetchError> {
        trace!(url = %url, "GET");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(format!("Failed to read response: {}", e)))
    }
}

fn trip_cache<V>(config: &ClientConfig) -> MokaCache<String, V>
where
    V: Clone + Send + Sync + 'static,
{
    MokaCache::builder()
        .max_capacity(config.trip_cache_capacity)
        .time_to_live(config.trip_cache_ttl)
        .build()
}

/// Unwrap moka's shared error; failures are not cached.
fn unshare(error: Arc<FetchError>) -> FetchError {
    FetchError::clone(&error)
}

impl TransitClient for HttpTransitClient {
    fn positions(&self) -> BoxFuture<'_, Result<Vec<VehiclePosition>, FetchError>> {
        Box::pin(async move {
            let body = self.get_bytes(self.positions_url()).await?;
            let positions = wire::decode_positions(&body)?;
            debug!(count = positions.len(), "Fetched vehicle positions");
            Ok(positions)
        })
    }

    fn trip_shape(&self, trip_id: &str) -> BoxFuture<'_, Result<PathGeometry, FetchError>> {
        let trip_id = trip_id.to_string();
        Box::pin(async move {
            let url = self.shape_url(&trip_id);
            self.shapes
                .try_get_with(trip_id, async move {
                    let body = self.get_bytes(url).await?;
                    wire::decode_shape(&body)
                })
                .await
                .map_err(unshare)
        })
    }

    fn trip_stops(&self, trip_id: &str) -> BoxFuture<'_, Result<Vec<ScheduledStop>, FetchError>> {
        let trip_id = trip_id.to_string();
        Box::pin(async move {
            let url = self.stops_url(&trip_id);
            self.stops
                .try_get_with(trip_id, async move {
                    let body = self.get_bytes(url).await?;
                    wire::decode_stops(&body)
                })
                .await
                .map_err(unshare)
        })
    }

    fn trip_details(&self, trip_id: &str) -> BoxFuture<'_, Result<TripDetails, FetchError>> {
        let trip_id = trip_id.to_string();
        Box::pin(async move {
            let url = self.details_url(&trip_id);
            self.details
                .try_get_with(trip_id, async move {
                    let body = self.get_bytes(url).await?;
                    wire::decode_details(&body)
                })
                .await
                .map_err(unshare)
        })
    }
}
