//! Core data types for live vehicle positions.
//!
//! A [`VehiclePosition`] is ephemeral: the whole set is replaced on every poll
//! tick and only the [`VehicleId`] carries identity from one tick to the next.

use std::fmt;

/// Stable identity key of a vehicle.
///
/// Marker handlers, the tracked selection and the rendered pool all key on
/// this value, so it must survive snapshot replacement unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleId(String);

impl VehicleId {
    /// Create a vehicle id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VehicleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VehicleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinates {
    /// Create a coordinate pair.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.latitude, self.longitude)
    }
}

/// Kind of transit line a vehicle is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RouteType {
    Bus,
    Tram,
    #[default]
    Unknown,
}

impl RouteType {
    /// Map a GTFS `route_type` code.
    ///
    /// Only the codes this system draws differently are recognised:
    /// `0` (tram, streetcar, light rail) and `3` (bus).
    pub fn from_gtfs_code(code: i64) -> Self {
        match code {
            0 => RouteType::Tram,
            3 => RouteType::Bus,
            _ => RouteType::Unknown,
        }
    }

    /// Map a route type name such as `"bus"` or `"Tram"`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "bus" => RouteType::Bus,
            "tram" => RouteType::Tram,
            _ => RouteType::Unknown,
        }
    }

    /// Lowercase name used in logs and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::Bus => "bus",
            RouteType::Tram => "tram",
            RouteType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One vehicle's reported position in a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct VehiclePosition {
    /// Identity key.
    pub vehicle_id: VehicleId,
    /// Trip the vehicle is currently running.
    pub trip_id: String,
    /// Route of that trip.
    pub route_id: String,
    /// Bus, tram, or unknown.
    pub route_type: RouteType,
    /// Human-readable label (fleet number).
    pub label: String,
    /// Reported location.
    pub coordinates: Coordinates,
    /// Heading in degrees, when reported.
    pub bearing: Option<f64>,
    /// `stop_sequence` of the stop the vehicle is at or approaching.
    pub current_stop_sequence: Option<u32>,
}

impl VehiclePosition {
    /// Create a position with the required fields; the rest default to empty.
    pub fn new(
        vehicle_id: impl Into<VehicleId>,
        trip_id: impl Into<String>,
        coordinates: Coordinates,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            trip_id: trip_id.into(),
            route_id: String::new(),
            route_type: RouteType::Unknown,
            label: String::new(),
            coordinates,
            bearing: None,
            current_stop_sequence: None,
        }
    }

    /// Set the route id and type.
    pub fn with_route(mut self, route_id: impl Into<String>, route_type: RouteType) -> Self {
        self.route_id = route_id.into();
        self.route_type = route_type;
        self
    }

    /// Set the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the bearing.
    pub fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(bearing);
        self
    }

    /// Set the current stop sequence.
    pub fn with_current_stop_sequence(mut self, sequence: u32) -> Self {
        self.current_stop_sequence = Some(sequence);
        self
    }
}
