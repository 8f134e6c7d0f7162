//! JSON wire formats and their conversion into core types.
//!
//! The server is lenient about types (ids may be numbers or strings, route
//! types may be GTFS codes or names) and about missing fields, so decoding
//! is lenient too. Shapes are GeoJSON, whose positions are
//! `[longitude, latitude]`.

use geojson::GeoJson;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::error::{FetchError, Resource};
use crate::model::{Coordinates, RouteType, VehiclePosition};
use crate::trip::{PathGeometry, ScheduledStop, ServiceTime, TripDetails};

// =============================================================================
// Shared field types
// =============================================================================

/// An identifier sent as either a JSON string or number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Integer(i64),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            IdValue::Text(text) => text,
            IdValue::Integer(n) => n.to_string(),
        }
    }
}

/// A route type sent as a GTFS code or a name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RouteTypeValue {
    Code(i64),
    Name(String),
}

impl From<RouteTypeValue> for RouteType {
    fn from(value: RouteTypeValue) -> Self {
        match value {
            RouteTypeValue::Code(code) => RouteType::from_gtfs_code(code),
            RouteTypeValue::Name(name) => RouteType::from_name(&name),
        }
    }
}

fn decode<T: DeserializeOwned>(resource: Resource, body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body).map_err(|e| FetchError::Decode {
        resource,
        message: e.to_string(),
    })
}

// =============================================================================
// Positions
// =============================================================================

#[derive(Debug, Deserialize)]
struct PositionRecord {
    vehicle: VehicleRecord,
    #[serde(default)]
    trip: Option<TripRef>,
    #[serde(default)]
    route: Option<RouteRef>,
    coords: CoordsRecord,
    #[serde(default)]
    bearing: Option<f64>,
    #[serde(default)]
    current_stop_sequence: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct VehicleRecord {
    id: IdValue,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TripRef {
    #[serde(default)]
    id: Option<IdValue>,
}

#[derive(Debug, Deserialize)]
struct RouteRef {
    #[serde(default)]
    id: Option<IdValue>,
    #[serde(default, rename = "type")]
    route_type: Option<RouteTypeValue>,
}

#[derive(Debug, Deserialize)]
struct CoordsRecord {
    latitude: f64,
    longitude: f64,
}

impl From<PositionRecord> for VehiclePosition {
    fn from(record: PositionRecord) -> Self {
        let (route_id, route_type) = match record.route {
            Some(route) => (
                route.id.map(IdValue::into_string).unwrap_or_default(),
                route.route_type.map(RouteType::from).unwrap_or_default(),
            ),
            None => (String::new(), RouteType::Unknown),
        };

        VehiclePosition {
            vehicle_id: record.vehicle.id.into_string().into(),
            trip_id: record
                .trip
                .and_then(|trip| trip.id)
                .map(IdValue::into_string)
                .unwrap_or_default(),
            route_id,
            route_type,
            label: record.vehicle.label.unwrap_or_default(),
            coordinates: Coordinates::new(record.coords.latitude, record.coords.longitude),
            bearing: record.bearing,
            current_stop_sequence: record.current_stop_sequence,
        }
    }
}

/// Decode a `/api/positions` body.
///
/// The body must be a JSON array. Individual records that do not decode are
/// skipped with a warning so one bad vehicle does not hold back the rest of
/// the snapshot.
pub fn decode_positions(body: &[u8]) -> Result<Vec<VehiclePosition>, FetchError> {
    let records: Vec<serde_json::Value> = decode(Resource::Positions, body)?;
    let total = records.len();

    let positions: Vec<VehiclePosition> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value::<PositionRecord>(record) {
            Ok(record) => Some(VehiclePosition::from(record)),
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed position record");
                None
            }
        })
        .collect();

    if positions.len() < total {
        warn!(
            skipped = total - positions.len(),
            total, "Position snapshot had malformed records"
        );
    }
    Ok(positions)
}

// =============================================================================
// Stops
// =============================================================================

#[derive(Debug, Deserialize)]
struct StopRecord {
    stop_sequence: u32,
    #[serde(default)]
    stop_name: Option<String>,
    #[serde(default)]
    stop_code: Option<IdValue>,
    #[serde(default)]
    zone_id: Option<IdValue>,
    #[serde(default)]
    departure_time: Option<String>,
    #[serde(default)]
    drop_off_type: Option<u8>,
    #[serde(default)]
    pickup_type: Option<u8>,
    #[serde(default)]
    stop_lat: Option<f64>,
    #[serde(default)]
    stop_lon: Option<f64>,
}

impl From<StopRecord> for ScheduledStop {
    fn from(record: StopRecord) -> Self {
        let coordinates = match (record.stop_lat, record.stop_lon) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        };
        ScheduledStop {
            stop_sequence: record.stop_sequence,
            name: record.stop_name.unwrap_or_default(),
            code: record.stop_code.map(IdValue::into_string).unwrap_or_default(),
            zone: record.zone_id.map(IdValue::into_string).unwrap_or_default(),
            departure_time: record.departure_time.as_deref().and_then(ServiceTime::parse),
            drop_off_type: record.drop_off_type.unwrap_or(0),
            pickup_type: record.pickup_type.unwrap_or(0),
            coordinates,
        }
    }
}

/// Decode a `/api/trips/{trip_id}/stops` body, ordered by `stop_sequence`.
pub fn decode_stops(body: &[u8]) -> Result<Vec<ScheduledStop>, FetchError> {
    let records: Vec<StopRecord> = decode(Resource::TripStops, body)?;
    let mut stops: Vec<ScheduledStop> = records.into_iter().map(ScheduledStop::from).collect();
    stops.sort_by_key(|stop| stop.stop_sequence);
    Ok(stops)
}

// =============================================================================
// Details
// =============================================================================

#[derive(Debug, Deserialize)]
struct DetailsRecord {
    #[serde(default)]
    route: Option<RouteDetailsRecord>,
    #[serde(default)]
    trip_headsign: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RouteDetailsRecord {
    #[serde(default)]
    agency: Option<AgencyRecord>,
    #[serde(default)]
    route_desc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AgencyRecord {
    #[serde(default)]
    agency_name: Option<String>,
    #[serde(default)]
    agency_url: Option<String>,
}

/// Decode a `/api/trips/{trip_id}` body.
pub fn decode_details(body: &[u8]) -> Result<TripDetails, FetchError> {
    let record: DetailsRecord = decode(Resource::TripDetails, body)?;
    let (agency, route_description) = match record.route {
        Some(route) => (route.agency, route.route_desc),
        None => (None, None),
    };
    let (agency_name, agency_url) = match agency {
        Some(agency) => (agency.agency_name, agency.agency_url),
        None => (None, None),
    };

    Ok(TripDetails {
        agency_name,
        agency_url,
        headsign: record.trip_headsign,
        route_description,
    })
}

// =============================================================================
// Shape
// =============================================================================

/// Decode a `/api/trips/{trip_id}/shape?geojson` body.
///
/// Accepts a FeatureCollection, a Feature, or a bare Geometry. Line strings
/// are concatenated in document order; other geometry kinds are ignored, so
/// a trip without a shape yields an empty path.
pub fn decode_shape(body: &[u8]) -> Result<PathGeometry, FetchError> {
    let decode_error = |message: String| FetchError::Decode {
        resource: Resource::TripShape,
        message,
    };
    let text = std::str::from_utf8(body).map_err(|e| decode_error(e.to_string()))?;
    let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| decode_error(e.to_string()))?;

    let mut points = Vec::new();
    match geojson {
        GeoJson::Geometry(geometry) => collect_line_points(&geometry.value, &mut points),
        GeoJson::Feature(feature) => {
            if let Some(geometry) = feature.geometry {
                collect_line_points(&geometry.value, &mut points);
            }
        }
        GeoJson::FeatureCollection(collection) => {
            for feature in collection.features {
                if let Some(geometry) = feature.geometry {
                    collect_line_points(&geometry.value, &mut points);
                }
            }
        }
    }
    Ok(PathGeometry::new(points))
}

fn collect_line_points(value: &geojson::Value, points: &mut Vec<Coordinates>) {
    match value {
        geojson::Value::LineString(line) => points.extend(line.iter().filter_map(|p| to_coordinates(p))),
        geojson::Value::MultiLineString(lines) => {
            for line in lines {
                points.extend(line.iter().filter_map(|p| to_coordinates(p)));
            }
        }
        geojson::Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                collect_line_points(&geometry.value, points);
            }
        }
        _ => {}
    }
}

/// GeoJSON `[lon, lat, ...]` to coordinates.
fn to_coordinates(position: &[f64]) -> Option<Coordinates> {
    match position {
        [longitude, latitude, ..] => Some(Coordinates::new(*latitude, *longitude)),
        _ => None,
    }
}
