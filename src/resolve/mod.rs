//! Turning GTFS geometry into references to OSM elements.
//!
//! Both resolvers absorb service failures: a stop or shape that cannot be
//! resolved leaves a relation with fewer members, it never fails the run.

pub mod stops;
pub mod ways;

pub use stops::{GreedyNearest, MatchedStop, StopAssignment, StopResolver, SyntheticStops};
pub use ways::{collapse_way_ids, ShapeResolver};
