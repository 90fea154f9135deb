//! Converts GTFS feeds into OSM `route` and `route_master` relations, written
//! as an osmChange "create" document for review before import.

pub mod builder;
pub mod config;
pub mod convert;
pub mod feed;
pub mod geo;
pub mod naming;
pub mod osm;
pub mod patterns;
pub mod providers;
pub mod resolve;

pub use builder::{ConversionSummary, RelationBuilder};
pub use config::{parse_tag_string, CliOptions, Config, ConvertOptions};
pub use convert::{convert_feed, convert_gtfs_to_osm, ConvertError};
