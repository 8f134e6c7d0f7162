//! Configuration for the tracking engine and the transport client.
//!
//! [`TrackerConfig`] and [`ClientConfig`] are the runtime configuration types.
//! [`ConfigFile`] is the on-disk INI representation the CLI reads and writes;
//! it converts into the runtime types.

mod file;

pub use file::{config_file_path, ConfigError, ConfigFile, ConfigKey};

use std::time::Duration;

/// Default interval between position polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Default timeout applied to every fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of consecutive snapshots a tracked vehicle may be missing
/// from before it is released.
pub const DEFAULT_RELEASE_AFTER_MISSING_TICKS: u32 = 3;

/// Default capacity of the engine's internal event channels.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default server the transport client talks to.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Default time trip shapes, stops and details stay cached.
pub const DEFAULT_TRIP_CACHE_TTL: Duration = Duration::from_secs(60);

/// Default number of cached entries per trip resource.
pub const DEFAULT_TRIP_CACHE_CAPACITY: u64 = 256;

/// Configuration for the tracking engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Interval between position polls.
    pub poll_interval: Duration,

    /// When false, positions are fetched once at startup and never again.
    pub updates_enabled: bool,

    /// Timeout applied to each position and trip fetch.
    pub fetch_timeout: Duration,

    /// Consecutive snapshots without the tracked vehicle before it is
    /// released; 0 keeps it tracked indefinitely.
    pub release_after_missing_ticks: u32,

    /// Capacity of the command, poll and trip result channels.
    pub event_channel_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            updates_enabled: true,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            release_after_missing_ticks: DEFAULT_RELEASE_AFTER_MISSING_TICKS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl TrackerConfig {
    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enable or disable recurring updates.
    pub fn with_updates_enabled(mut self, enabled: bool) -> Self {
        self.updates_enabled = enabled;
        self
    }

    /// Set the fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the missing-snapshot release threshold.
    pub fn with_release_after_missing_ticks(mut self, ticks: u32) -> Self {
        self.release_after_missing_ticks = ticks;
        self
    }

    /// Set the event channel capacity (minimum 1).
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }
}

/// Configuration for [`crate::client::HttpTransitClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Server root, e.g. `http://127.0.0.1:5000`.
    pub base_url: String,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// `User-Agent` header value.
    pub user_agent: String,

    /// Time trip resources stay cached.
    pub trip_cache_ttl: Duration,

    /// Maximum cached entries per trip resource.
    pub trip_cache_capacity: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            user_agent: default_user_agent(),
            trip_cache_ttl: DEFAULT_TRIP_CACHE_TTL,
            trip_cache_capacity: DEFAULT_TRIP_CACHE_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given server.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the `User-Agent` header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the trip resource cache TTL.
    pub fn with_trip_cache_ttl(mut self, ttl: Duration) -> Self {
        self.trip_cache_ttl = ttl;
        self
    }
}

/// `livetrack/<version> (+<homepage>)`.
pub fn default_user_agent() -> String {
    format!(
        "{}/{} (+{})",
        env!("CARGO_PKG_NAME"),
        crate::VERSION,
        env!("CARGO_PKG_HOMEPAGE")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_config_default() {
        let config = TrackerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(5000));
        assert!(config.updates_enabled);
        assert_eq!(config.release_after_missing_ticks, 3);
    }

    #[test]
    fn test_tracker_config_builder() {
        let config = TrackerConfig::default()
            .with_poll_interval(Duration::from_secs(1))
            .with_updates_enabled(false)
            .with_fetch_timeout(Duration::from_secs(2))
            .with_release_after_missing_ticks(0)
            .with_event_channel_capacity(0);

        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert!(!config.updates_enabled);
        assert_eq!(config.fetch_timeout, Duration::from_secs(2));
        assert_eq!(config.release_after_missing_ticks, 0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn test_client_config_new() {
        let config = ClientConfig::new("http://transit.local:8080")
            .with_timeout(Duration::from_secs(3))
            .with_trip_cache_ttl(Duration::from_secs(5));

        assert_eq!(config.base_url, "http://transit.local:8080");
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.trip_cache_ttl, Duration::from_secs(5));
    }

    #[test]
    fn test_default_user_agent_names_crate_and_version() {
        let agent = default_user_agent();
        assert!(agent.starts_with("livetrack/"));
        assert!(agent.contains(crate::VERSION));
        assert!(agent.contains("(+http"));
    }
}
