//! Trip stop-patterns: one per trip, then collapsed per route.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use tracing::debug;

use crate::feed::{Feed, Route, RouteId, ShapeId, StopId, Trip, TripId};

/// The ordered stops one trip visits. Repeats are real revisits and stay in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripPattern {
    pub trip_id: TripId,
    pub route_id: RouteId,
    pub shape_id: Option<ShapeId>,
    pub stops: Vec<StopId>,
}

/// Which routes take part in a conversion. Empty filters accept everything.
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    /// GTFS `route_type` codes to keep
    pub route_types: Option<Vec<u16>>,
    /// Matched anywhere in the route id
    pub route_ref_pattern: Option<Regex>,
    pub agency_id: Option<String>,
}

impl PatternFilter {
    pub fn accepts(&self, route: &Route) -> bool {
        if let Some(types) = &self.route_types {
            match route.route_type {
                Some(code) if types.contains(&code) => {}
                _ => return false,
            }
        }
        if let Some(pattern) = &self.route_ref_pattern {
            if !pattern.is_match(route.id.as_str()) {
                return false;
            }
        }
        if let Some(agency) = &self.agency_id {
            if route.agency_id.as_deref() != Some(agency.as_str()) {
                return false;
            }
        }
        true
    }
}

/// A route together with one pattern per trip, in trips-table order.
#[derive(Debug, Clone)]
pub struct RoutePatterns<'a> {
    pub route: &'a Route,
    pub patterns: Vec<TripPattern>,
}

pub fn extract_patterns<'a>(feed: &'a Feed, filter: &PatternFilter) -> Vec<RoutePatterns<'a>> {
    let mut trips_per_route: HashMap<&RouteId, Vec<&Trip>> = HashMap::new();
    for trip in &feed.trips {
        trips_per_route.entry(&trip.route_id).or_default().push(trip);
    }

    feed.routes
        .iter()
        .filter(|route| {
            let keep = filter.accepts(route);
            if !keep {
                debug!(route = %route.id, "Route filtered out");
            }
            keep
        })
        .map(|route| {
            let patterns: Vec<TripPattern> = trips_per_route
                .get(&route.id)
                .map(|trips| trips.iter().map(|trip| pattern_for_trip(feed, trip)).collect())
                .unwrap_or_default();
            RoutePatterns { route, patterns }
        })
        .collect()
}

fn pattern_for_trip(feed: &Feed, trip: &Trip) -> TripPattern {
    let stops: Vec<StopId> = feed
        .stop_times
        .get(&trip.id)
        .map(|stop_times| stop_times.iter().map(|st| st.stop_id.clone()).collect())
        .unwrap_or_default();

    TripPattern {
        trip_id: trip.id.clone(),
        route_id: trip.route_id.clone(),
        shape_id: trip.shape_id.clone(),
        stops,
    }
}

/// Keeps the first pattern for every distinct stop sequence, in input order.
///
/// Trip and shape ids play no part: two trips over the same stops on different
/// shapes collapse into the first one.
pub fn deduplicate(patterns: Vec<TripPattern>) -> Vec<TripPattern> {
    let keep: Vec<bool> = {
        let mut seen: HashSet<&[StopId]> = HashSet::new();
        patterns.iter().map(|p| seen.insert(p.stops.as_slice())).collect()
    };

    patterns
        .into_iter()
        .zip(keep)
        .filter_map(|(pattern, keep)| keep.then_some(pattern))
        .collect()
}
