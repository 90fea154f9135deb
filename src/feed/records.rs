use serde::Deserialize;

use crate::geo::Coord;

macro_rules! feed_id {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

feed_id!(RouteId);
feed_id!(TripId);
feed_id!(StopId);
feed_id!(ShapeId);

#[derive(Debug, Clone)]
pub struct Agency {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub id: RouteId,
    pub agency_id: Option<String>,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    /// `None` when the feed value is missing or not an integer
    pub route_type: Option<u16>,
    pub color: Option<String>,
}

impl Route {
    /// The public-facing reference: the short name, or the route id when there is none.
    pub fn reference(&self) -> &str {
        match self.short_name.as_deref().map(str::trim) {
            Some(short) if !short.is_empty() => short,
            _ => self.id.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Trip {
    pub id: TripId,
    pub route_id: RouteId,
    pub shape_id: Option<ShapeId>,
}

#[derive(Debug, Clone)]
pub struct Stop {
    pub id: StopId,
    pub name: String,
    pub pos: Coord,
}

#[derive(Debug, Clone)]
pub struct StopTime {
    pub stop_id: StopId,
    pub stop_sequence: u32,
}

/// A stop joined against the stops table, in the order a pattern visits it.
#[derive(Debug, Clone, PartialEq)]
pub struct StopLocation {
    pub stop_id: StopId,
    pub lat: f64,
    pub lon: f64,
    pub name: String,
}

impl StopLocation {
    pub fn coord(&self) -> Coord {
        Coord::new(self.lat, self.lon)
    }
}

#[derive(Deserialize)]
pub(super) struct AgencyRecord {
    pub agency_id: Option<String>,
    pub agency_name: String,
}

#[derive(Deserialize)]
pub(super) struct RouteRecord {
    pub route_id: RouteId,
    pub agency_id: Option<String>,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
    pub route_type: Option<String>,
    pub route_color: Option<String>,
}

impl From<RouteRecord> for Route {
    fn from(rec: RouteRecord) -> Self {
        Route {
            id: rec.route_id,
            agency_id: rec.agency_id,
            short_name: rec.route_short_name,
            long_name: rec.route_long_name,
            route_type: rec.route_type.as_deref().and_then(parse_route_type),
            color: rec.route_color,
        }
    }
}

#[derive(Deserialize)]
pub(super) struct TripRecord {
    pub route_id: RouteId,
    pub trip_id: TripId,
    pub shape_id: Option<ShapeId>,
}

#[derive(Deserialize)]
pub(super) struct StopRecord {
    pub stop_id: StopId,
    pub stop_name: Option<String>,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
}

#[derive(Deserialize)]
pub(super) struct StopTimeRecord {
    pub trip_id: TripId,
    pub stop_id: StopId,
    pub stop_sequence: u32,
}

#[derive(Deserialize)]
pub(super) struct ShapeRecord {
    pub shape_id: ShapeId,
    pub shape_pt_lat: f64,
    pub shape_pt_lon: f64,
    pub shape_pt_sequence: u32,
}

/// Feed values such as "3" or " 3 " parse; anything else is treated as unknown.
pub fn parse_route_type(raw: &str) -> Option<u16> {
    raw.trim().parse().ok()
}
