//! Trip overlay data: path geometry, stops and display metadata.
//!
//! Stop roles and statuses are derived here rather than by the transport:
//! the role from the GTFS `(drop_off_type, pickup_type)` pair, the status from
//! the tracked vehicle's `current_stop_sequence` at selection time.

use std::fmt;

use crate::error::{FetchError, Resource, TrackingError};
use crate::model::{Coordinates, VehicleId};
use crate::tracking::SelectionToken;

// =============================================================================
// Geometry
// =============================================================================

/// Ordered trip path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathGeometry {
    points: Vec<Coordinates>,
}

impl PathGeometry {
    /// Create a path from ordered points.
    pub fn new(points: Vec<Coordinates>) -> Self {
        Self { points }
    }

    /// The points in travel order.
    pub fn points(&self) -> &[Coordinates] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// =============================================================================
// Service time
// =============================================================================

/// A GTFS service time (`HH:MM:SS`, hours may exceed 23 for after-midnight trips).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceTime {
    seconds: u32,
}

impl ServiceTime {
    /// Create from seconds since the start of the service day.
    pub fn from_seconds(seconds: u32) -> Self {
        Self { seconds }
    }

    /// Parse `H:MM:SS` or `HH:MM:SS`.
    ///
    /// Returns `None` for malformed input, out-of-range minutes/seconds, or
    /// an hour field too large to represent.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split(':');
        let hours: u32 = parts.next()?.parse().ok()?;
        let minutes: u32 = parts.next()?.parse().ok()?;
        let seconds: u32 = parts.next()?.parse().ok()?;
        if parts.next().is_some() || minutes > 59 || seconds > 59 {
            return None;
        }
        let seconds = hours.checked_mul(3600)?.checked_add(minutes * 60 + seconds)?;
        Some(Self { seconds })
    }

    pub fn total_seconds(&self) -> u32 {
        self.seconds
    }

    pub fn hours(&self) -> u32 {
        self.seconds / 3600
    }

    pub fn minutes(&self) -> u32 {
        (self.seconds % 3600) / 60
    }
}

impl fmt::Display for ServiceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours(),
            self.minutes(),
            self.seconds % 60
        )
    }
}

// =============================================================================
// Stops
// =============================================================================

/// How a stop is served, derived from its boarding rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopRole {
    /// Boarding only: the first stop of the trip.
    Starting,
    /// Alighting only: the last stop of the trip.
    Final,
    /// Served on request.
    Request,
    Normal,
}

impl StopRole {
    /// Derive the role from GTFS `drop_off_type` and `pickup_type`.
    ///
    /// `(1, 0)` starting, `(0, 1)` final, `(3, 3)` request, anything else normal.
    pub fn from_boarding(drop_off_type: u8, pickup_type: u8) -> Self {
        match (drop_off_type, pickup_type) {
            (1, 0) => StopRole::Starting,
            (0, 1) => StopRole::Final,
            (3, 3) => StopRole::Request,
            _ => StopRole::Normal,
        }
    }
}

/// Position of a stop relative to the tracked vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopStatus {
    Past,
    Current,
    Next,
}

impl StopStatus {
    /// Compare a stop's sequence with the vehicle's current one.
    ///
    /// `None` when the vehicle does not report a current stop.
    pub fn classify(stop_sequence: u32, current: Option<u32>) -> Option<Self> {
        let current = current?;
        Some(match stop_sequence.cmp(&current) {
            std::cmp::Ordering::Less => StopStatus::Past,
            std::cmp::Ordering::Equal => StopStatus::Current,
            std::cmp::Ordering::Greater => StopStatus::Next,
        })
    }
}

/// A stop as scheduled for a trip, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledStop {
    /// Ordering key, unique within the trip.
    pub stop_sequence: u32,
    pub name: String,
    pub code: String,
    pub zone: String,
    pub departure_time: Option<ServiceTime>,
    pub drop_off_type: u8,
    pub pickup_type: u8,
    pub coordinates: Option<Coordinates>,
}

impl ScheduledStop {
    /// Create a regular stop with the given sequence and name.
    pub fn new(stop_sequence: u32, name: impl Into<String>) -> Self {
        Self {
            stop_sequence,
            name: name.into(),
            code: String::new(),
            zone: String::new(),
            departure_time: None,
            drop_off_type: 0,
            pickup_type: 0,
            coordinates: None,
        }
    }

    /// Set the boarding rules.
    pub fn with_boarding(mut self, drop_off_type: u8, pickup_type: u8) -> Self {
        self.drop_off_type = drop_off_type;
        self.pickup_type = pickup_type;
        self
    }
}

/// A stop ready for display on the trip overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct TripStop {
    pub stop_sequence: u32,
    pub name: String,
    pub code: String,
    pub zone: String,
    pub departure_time: Option<ServiceTime>,
    pub coordinates: Option<Coordinates>,
    pub role: StopRole,
    /// `None` when the vehicle reports no current stop.
    pub status: Option<StopStatus>,
}

impl TripStop {
    /// Classify a scheduled stop against the vehicle's current stop sequence.
    pub fn classify(stop: ScheduledStop, current_stop_sequence: Option<u32>) -> Self {
        Self {
            role: StopRole::from_boarding(stop.drop_off_type, stop.pickup_type),
            status: StopStatus::classify(stop.stop_sequence, current_stop_sequence),
            stop_sequence: stop.stop_sequence,
            name: stop.name,
            code: stop.code,
            zone: stop.zone,
            departure_time: stop.departure_time,
            coordinates: stop.coordinates,
        }
    }
}

/// Classify a trip's stops and order them by `stop_sequence`.
pub fn classify_stops(stops: Vec<ScheduledStop>, current_stop_sequence: Option<u32>) -> Vec<TripStop> {
    let mut stops: Vec<TripStop> = stops
        .into_iter()
        .map(|stop| TripStop::classify(stop, current_stop_sequence))
        .collect();
    stops.sort_by_key(|stop| stop.stop_sequence);
    stops
}

// =============================================================================
// Details
// =============================================================================

/// Display metadata for a trip. Not used for reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripDetails {
    pub agency_name: Option<String>,
    pub agency_url: Option<String>,
    pub headsign: Option<String>,
    pub route_description: Option<String>,
}

impl TripDetails {
    /// Whether the route carries a tariff note (a non-empty route description).
    pub fn has_tariff_note(&self) -> bool {
        self.route_description
            .as_deref()
            .is_some_and(|desc| !desc.trim().is_empty())
    }
}

// =============================================================================
// Overlay
// =============================================================================

/// The trip overlay owned by one selection.
///
/// Built from scratch for every selection and filled in as the three fetches
/// settle. Failures are remembered so they can be reported once, after the
/// last fetch has settled.
#[derive(Debug, Clone)]
pub struct TripOverlay {
    token: SelectionToken,
    trip_id: String,
    current_stop_sequence: Option<u32>,
    path: Option<PathGeometry>,
    stops: Vec<TripStop>,
    details: Option<TripDetails>,
    settled: Vec<Resource>,
    failures: Vec<(Resource, FetchError)>,
    reported: bool,
}

impl TripOverlay {
    /// Start an empty overlay for a selection.
    pub fn new(
        token: SelectionToken,
        trip_id: impl Into<String>,
        current_stop_sequence: Option<u32>,
    ) -> Self {
        Self {
            token,
            trip_id: trip_id.into(),
            current_stop_sequence,
            path: None,
            stops: Vec::new(),
            details: None,
            settled: Vec::new(),
            failures: Vec::new(),
            reported: false,
        }
    }

    pub fn token(&self) -> &SelectionToken {
        &self.token
    }

    pub fn vehicle_id(&self) -> &VehicleId {
        self.token.vehicle_id()
    }

    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    pub fn current_stop_sequence(&self) -> Option<u32> {
        self.current_stop_sequence
    }

    pub fn path(&self) -> Option<&PathGeometry> {
        self.path.as_ref()
    }

    pub fn stops(&self) -> &[TripStop] {
        &self.stops
    }

    pub fn details(&self) -> Option<&TripDetails> {
        self.details.as_ref()
    }

    /// Store the path and mark the shape fetch settled.
    pub fn set_path(&mut self, path: PathGeometry) {
        self.path = Some(path);
        self.settle(Resource::TripShape);
    }

    /// Classify and store the stops; returns the classified stops.
    pub fn set_stops(&mut self, stops: Vec<ScheduledStop>) -> &[TripStop] {
        self.stops = classify_stops(stops, self.current_stop_sequence);
        self.settle(Resource::TripStops);
        &self.stops
    }

    /// Store the details and mark the details fetch settled.
    pub fn set_details(&mut self, details: TripDetails) {
        self.details = Some(details);
        self.settle(Resource::TripDetails);
    }

    /// Record a failed fetch.
    pub fn record_failure(&mut self, resource: Resource, error: FetchError) {
        self.failures.push((resource, error));
        self.settle(resource);
    }

    /// Whether all three fetches have either succeeded or failed.
    pub fn is_settled(&self) -> bool {
        Resource::TRIP.iter().all(|r| self.settled.contains(r))
    }

    /// Resources whose fetch failed, in request order.
    pub fn failed_resources(&self) -> Vec<Resource> {
        let mut failed: Vec<Resource> = self.failures.iter().map(|(r, _)| *r).collect();
        failed.sort();
        failed
    }

    /// The error to report for this overlay, at most once.
    ///
    /// Returns `None` until every fetch has settled, when nothing failed, or
    /// when the report was already taken. All three failing is reported as a
    /// transient error for the first failure; anything less is a partial
    /// overlay.
    pub fn take_failure_report(&mut self) -> Option<TrackingError> {
        if self.reported || !self.is_settled() || self.failures.is_empty() {
            return None;
        }
        self.reported = true;

        if self.failures.len() == Resource::TRIP.len() {
            let (resource, source) = self.failures[0].clone();
            return Some(TrackingError::Transient { resource, source });
        }

        Some(TrackingError::PartialOverlay {
            vehicle_id: self.vehicle_id().clone(),
            failed: self.failed_resources(),
        })
    }

    fn settle(&mut self, resource: Resource) {
        if !self.settled.contains(&resource) {
            self.settled.push(resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> SelectionToken {
        SelectionToken::new(1, VehicleId::new("v1"))
    }

    #[test]
    fn test_stop_status_classification() {
        assert_eq!(StopStatus::classify(3, Some(5)), Some(StopStatus::Past));
        assert_eq!(StopStatus::classify(5, Some(5)), Some(StopStatus::Current));
        assert_eq!(StopStatus::classify(7, Some(5)), Some(StopStatus::Next));
    }

    #[test]
    fn test_stop_status_without_current_sequence_is_neutral() {
        assert_eq!(StopStatus::classify(1, None), None);
        assert_eq!(StopStatus::classify(0, None), None);
    }

    #[test]
    fn test_stop_role_mapping() {
        assert_eq!(StopRole::from_boarding(1, 0), StopRole::Starting);
        assert_eq!(StopRole::from_boarding(0, 1), StopRole::Final);
        assert_eq!(StopRole::from_boarding(3, 3), StopRole::Request);
        assert_eq!(StopRole::from_boarding(0, 0), StopRole::Normal);
        assert_eq!(StopRole::from_boarding(1, 1), StopRole::Normal);
        assert_eq!(StopRole::from_boarding(3, 0), StopRole::Normal);
        assert_eq!(StopRole::from_boarding(2, 2), StopRole::Normal);
    }

    #[test]
    fn test_service_time_parse() {
        let time = ServiceTime::parse("08:05:30").unwrap();
        assert_eq!(time.total_seconds(), 8 * 3600 + 5 * 60 + 30);
        assert_eq!(time.to_string(), "08:05:30");

        assert_eq!(ServiceTime::parse("7:00:00").unwrap().to_string(), "07:00:00");
    }

    #[test]
    fn test_service_time_after_midnight() {
        let time = ServiceTime::parse("25:10:00").unwrap();
        assert_eq!(time.hours(), 25);
        assert_eq!(time.to_string(), "25:10:00");
    }

    #[test]
    fn test_service_time_rejects_malformed_input() {
        assert_eq!(ServiceTime::parse(""), None);
        assert_eq!(ServiceTime::parse("12:00"), None);
        assert_eq!(ServiceTime::parse("12:60:00"), None);
        assert_eq!(ServiceTime::parse("12:00:00:00"), None);
        assert_eq!(ServiceTime::parse("ab:cd:ef"), None);
    }

    #[test]
    fn test_service_time_rejects_overflowing_hours() {
        assert_eq!(ServiceTime::parse("4000000:00:00"), None);
        assert_eq!(ServiceTime::parse("1193046:28:16"), None);
        assert_eq!(
            ServiceTime::parse("1193046:28:15").map(|t| t.total_seconds()),
            Some(u32::MAX)
        );
    }

    #[test]
    fn test_classify_stops_orders_by_sequence() {
        let stops = vec![
            ScheduledStop::new(7, "Rondo").with_boarding(0, 1),
            ScheduledStop::new(3, "Dworzec").with_boarding(1, 0),
            ScheduledStop::new(5, "Most").with_boarding(3, 3),
        ];

        let classified = classify_stops(stops, Some(5));
        let sequences: Vec<u32> = classified.iter().map(|s| s.stop_sequence).collect();
        assert_eq!(sequences, vec![3, 5, 7]);

        assert_eq!(classified[0].role, StopRole::Starting);
        assert_eq!(classified[0].status, Some(StopStatus::Past));
        assert_eq!(classified[1].role, StopRole::Request);
        assert_eq!(classified[1].status, Some(StopStatus::Current));
        assert_eq!(classified[2].role, StopRole::Final);
        assert_eq!(classified[2].status, Some(StopStatus::Next));
    }

    #[test]
    fn test_tariff_note() {
        let mut details = TripDetails::default();
        assert!(!details.has_tariff_note());
        details.route_description = Some("   ".to_string());
        assert!(!details.has_tariff_note());
        details.route_description = Some("Strefa A".to_string());
        assert!(details.has_tariff_note());
    }

    #[test]
    fn test_overlay_reports_nothing_until_settled() {
        let mut overlay = TripOverlay::new(token(), "t1", Some(2));
        overlay.record_failure(
            Resource::TripShape,
            FetchError::Request("boom".to_string()),
        );
        assert!(!overlay.is_settled());
        assert_eq!(overlay.take_failure_report(), None);

        overlay.set_stops(vec![ScheduledStop::new(1, "A")]);
        overlay.set_details(TripDetails::default());
        assert!(overlay.is_settled());

        let report = overlay.take_failure_report();
        assert_eq!(
            report,
            Some(TrackingError::PartialOverlay {
                vehicle_id: VehicleId::new("v1"),
                failed: vec![Resource::TripShape],
            })
        );
        // Reported exactly once
        assert_eq!(overlay.take_failure_report(), None);
    }

    #[test]
    fn test_overlay_all_failed_is_transient() {
        let mut overlay = TripOverlay::new(token(), "t1", None);
        for resource in Resource::TRIP {
            overlay.record_failure(resource, FetchError::Request(resource.to_string()));
        }

        match overlay.take_failure_report() {
            Some(TrackingError::Transient { resource, .. }) => {
                assert_eq!(resource, Resource::TripShape)
            }
            other => panic!("expected transient error, got {:?}", other),
        }
    }

    #[test]
    fn test_overlay_without_failures_reports_nothing() {
        let mut overlay = TripOverlay::new(token(), "t1", None);
        overlay.set_path(PathGeometry::default());
        overlay.set_stops(Vec::new());
        overlay.set_details(TripDetails::default());
        assert!(overlay.is_settled());
        assert_eq!(overlay.take_failure_report(), None);
        assert!(overlay.stops().is_empty());
    }
}
