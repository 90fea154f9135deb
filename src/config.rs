use clap::Parser;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::osm::Tags;
use crate::patterns::PatternFilter;

// Using Kumi Systems mirror - main overpass-api.de is often overloaded
const DEFAULT_OVERPASS_URL: &str = "https://overpass.kumi.systems/api/interpreter";
const DEFAULT_VALHALLA_URL: &str = "https://valhalla1.openstreetmap.de/trace_attributes";

/// Largest stop search radius we accept, in meters
pub const MAX_STOP_SEARCH_RADIUS_M: f64 = 10.0;

/// Service endpoints and retry behaviour. Every field has a default, so the
/// YAML file is optional and may be partial.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub overpass: OverpassConfig,
    pub valhalla: ValhallaConfig,
    pub retry: RetryConfig,
    /// Written to the `generator` attribute of the output
    pub generator: Generator,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverpassConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OVERPASS_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValhallaConfig {
    pub url: String,
    /// Valhalla costing model (bus, auto, pedestrian, ...)
    pub costing: String,
    pub timeout_secs: u64,
}

impl Default for ValhallaConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_VALHALLA_URL.to_string(),
            costing: "bus".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub stops: RetryPolicy,
    pub ways: RetryPolicy,
}

/// Fixed-delay retries: one attempt, then up to `max_retries` more.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay_secs: f64,
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_secs.max(0.0))
    }

    /// No retries and no waiting, for callers that want a single shot.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay_secs: 0.0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_secs: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct Generator(pub String);

impl Default for Generator {
    fn default() -> Self {
        Self(env!("CARGO_PKG_NAME").to_string())
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

/// Command line of the `gtfs-to-osm` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "gtfs-to-osm",
    version,
    about = "Convert a GTFS feed into OSM route relations for import review",
    allow_negative_numbers = true
)]
pub struct CliOptions {
    /// GTFS zip archive to read
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write the osmChange document
    #[arg(short, long)]
    pub output: PathBuf,

    /// Leave stops out of route relations
    #[arg(long)]
    pub exclude_stops: bool,

    /// Leave ways out of route relations
    #[arg(long)]
    pub exclude_routes: bool,

    /// Create new stop nodes for GTFS stops with no OSM counterpart
    #[arg(long)]
    pub add_missing_stops: bool,

    /// Radius in meters for matching GTFS stops to OSM nodes (at most 10)
    #[arg(long, default_value_t = MAX_STOP_SEARCH_RADIUS_M)]
    pub stop_search_radius: f64,

    /// Append the travel direction to route names
    #[arg(long)]
    pub add_route_direction: bool,

    /// Tag route masters with the route's mode (tram, ferry, ...) instead of bus
    #[arg(long)]
    pub mode_aware_route_master: bool,

    /// Only convert routes whose id matches this regular expression
    #[arg(long)]
    pub route_ref_pattern: Option<String>,

    /// Extra tags for every relation, as `key=value;key=value`
    #[arg(long)]
    pub relation_tags: Option<String>,

    /// Only convert these GTFS route types (comma separated, e.g. `3,11`)
    #[arg(long, value_delimiter = ',')]
    pub route_types: Option<Vec<u16>>,

    /// Only convert routes of this agency
    #[arg(long = "agency")]
    pub agency_id: Option<String>,

    /// YAML file with service endpoints and retry settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliOptions {
    pub fn convert_options(&self) -> Result<ConvertOptions, OptionsError> {
        ConvertOptions {
            exclude_stops: self.exclude_stops,
            exclude_routes: self.exclude_routes,
            add_missing_stops: self.add_missing_stops,
            stop_search_radius: self.stop_search_radius,
            add_route_direction: self.add_route_direction,
            mode_aware_route_master: self.mode_aware_route_master,
            route_ref_pattern: self.route_ref_pattern.clone(),
            route_types: self.route_types.clone(),
            agency_id: self.agency_id.clone(),
            relation_tags: self
                .relation_tags
                .as_deref()
                .map(|raw| parse_tag_pairs(raw).into_iter().collect())
                .unwrap_or_default(),
        }
        .validate()
    }

    /// The YAML config when one was given, defaults otherwise.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        match &self.config {
            Some(path) => Config::load(path),
            None => Ok(Config::default()),
        }
    }
}

/// What to convert and how. Built from the command line, then checked with
/// [`ConvertOptions::validate`].
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub exclude_stops: bool,
    pub exclude_routes: bool,
    pub add_missing_stops: bool,
    pub stop_search_radius: f64,
    pub add_route_direction: bool,
    /// `route_master=<mode>` rather than the default `route_master=bus`
    pub mode_aware_route_master: bool,
    pub route_ref_pattern: Option<String>,
    pub route_types: Option<Vec<u16>>,
    pub agency_id: Option<String>,
    /// Extra tags for every route and route_master relation
    pub relation_tags: Tags,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            exclude_stops: false,
            exclude_routes: false,
            add_missing_stops: false,
            stop_search_radius: MAX_STOP_SEARCH_RADIUS_M,
            add_route_direction: false,
            mode_aware_route_master: false,
            route_ref_pattern: None,
            route_types: None,
            agency_id: None,
            relation_tags: Tags::default(),
        }
    }
}

impl ConvertOptions {
    /// Rejects contradictory flags and clamps the search radius.
    pub fn validate(mut self) -> Result<Self, OptionsError> {
        if self.add_missing_stops && self.exclude_stops {
            return Err(OptionsError::MissingStopsWithoutStops);
        }
        if self.exclude_stops && self.exclude_routes {
            return Err(OptionsError::NothingToConvert);
        }
        if !(self.stop_search_radius > 0.0) {
            return Err(OptionsError::NonPositiveRadius(self.stop_search_radius));
        }
        if self.stop_search_radius > MAX_STOP_SEARCH_RADIUS_M {
            warn!(
                requested = self.stop_search_radius,
                max = MAX_STOP_SEARCH_RADIUS_M,
                "Stop search radius is too large, reverting to the maximum"
            );
            self.stop_search_radius = MAX_STOP_SEARCH_RADIUS_M;
        }
        if let Some(pattern) = &self.route_ref_pattern {
            Regex::new(pattern).map_err(|e| OptionsError::InvalidPattern(e.to_string()))?;
        }
        Ok(self)
    }

    pub fn pattern_filter(&self) -> Result<PatternFilter, OptionsError> {
        let route_ref_pattern = self
            .route_ref_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| OptionsError::InvalidPattern(e.to_string()))?;

        Ok(PatternFilter {
            route_types: self.route_types.clone(),
            route_ref_pattern,
            agency_id: self.agency_id.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("Cannot add missing stops without including stops")]
    MissingStopsWithoutStops,
    #[error("Nothing to convert: both stops and routes are excluded")]
    NothingToConvert,
    #[error("Stop search radius must be a positive number, got {0}")]
    NonPositiveRadius(f64),
    #[error("Invalid route reference pattern: {0}")]
    InvalidPattern(String),
}

/// Parses `key=value;key=value` into tags. Keys and values are trimmed, values
/// may contain `=`, and entries without a key or `=` are skipped.
pub fn parse_tag_string(raw: &str) -> HashMap<String, String> {
    parse_tag_pairs(raw).into_iter().collect()
}

/// Like [`parse_tag_string`], keeping the order the pairs were written in.
pub fn parse_tag_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn tag_strings() {
        assert_eq!(
            parse_tag_string("operator=A;network=B C"),
            map(&[("operator", "A"), ("network", "B C")])
        );
        assert_eq!(parse_tag_string("malformed;key=value"), map(&[("key", "value")]));
        assert_eq!(
            parse_tag_string(" key = value ; key2 = value2 "),
            map(&[("key", "value"), ("key2", "value2")])
        );
        assert_eq!(
            parse_tag_string("url=https://example.com?a=b;name=Test"),
            map(&[("url", "https://example.com?a=b"), ("name", "Test")])
        );
        assert_eq!(
            parse_tag_string("network:wikidata=Q123;operator=Test"),
            map(&[("network:wikidata", "Q123"), ("operator", "Test")])
        );
        assert!(parse_tag_string("").is_empty());
        assert!(parse_tag_string(";;;").is_empty());
        assert!(parse_tag_string("=orphan").is_empty());
    }

    #[test]
    fn tag_pairs_keep_order() {
        let pairs = parse_tag_pairs("operator=TransitCenter;network=Whoville Bus;network:wikidata=Q123");
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["operator", "network", "network:wikidata"]);
    }

    #[test]
    fn partial_yaml_config_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "valhalla:\n  costing: auto\nretry:\n  ways:\n    max_retries: 5\ngenerator: my-tool\n",
        )
        .unwrap();

        assert_eq!(config.valhalla.costing, "auto");
        assert_eq!(config.valhalla.url, DEFAULT_VALHALLA_URL);
        assert_eq!(config.overpass.url, DEFAULT_OVERPASS_URL);
        assert_eq!(config.retry.ways.max_retries, 5);
        assert_eq!(config.retry.ways.delay_secs, 2.0);
        assert_eq!(config.retry.stops, RetryPolicy::default());
        assert_eq!(config.generator.0, "my-tool");
    }

    #[test]
    fn missing_config_file() {
        assert!(matches!(
            Config::load("/nonexistent/config.yaml"),
            Err(ConfigError::ReadError(_))
        ));
    }

    #[test]
    fn option_validation() {
        let missing_without_stops = ConvertOptions {
            add_missing_stops: true,
            exclude_stops: true,
            ..Default::default()
        };
        assert!(matches!(
            missing_without_stops.validate(),
            Err(OptionsError::MissingStopsWithoutStops)
        ));

        let nothing = ConvertOptions {
            exclude_stops: true,
            exclude_routes: true,
            ..Default::default()
        };
        assert!(matches!(nothing.validate(), Err(OptionsError::NothingToConvert)));

        let negative = ConvertOptions {
            stop_search_radius: -1.0,
            ..Default::default()
        };
        assert!(matches!(negative.validate(), Err(OptionsError::NonPositiveRadius(_))));

        let zero = ConvertOptions {
            stop_search_radius: 0.0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(OptionsError::NonPositiveRadius(_))));

        let bad_pattern = ConvertOptions {
            route_ref_pattern: Some("(".into()),
            ..Default::default()
        };
        assert!(matches!(bad_pattern.validate(), Err(OptionsError::InvalidPattern(_))));
    }

    #[test]
    fn large_radius_is_clamped() {
        let options = ConvertOptions {
            stop_search_radius: 50.0,
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(options.stop_search_radius, MAX_STOP_SEARCH_RADIUS_M);
    }

    #[test]
    fn filter_from_options() {
        let options = ConvertOptions {
            route_ref_pattern: Some("^F8".into()),
            route_types: Some(vec![3]),
            ..Default::default()
        };
        let filter = options.pattern_filter().unwrap();
        assert!(filter.route_ref_pattern.unwrap().is_match("F8X"));
        assert_eq!(filter.route_types, Some(vec![3]));
    }

    #[test]
    fn command_line_to_options() {
        let cli = CliOptions::try_parse_from([
            "gtfs-to-osm",
            "-i",
            "feed.zip",
            "-o",
            "out/routes.osc",
            "--add-missing-stops",
            "--stop-search-radius",
            "25",
            "--route-types",
            "3,11",
            "--relation-tags",
            "operator=Transit Co;network=Metro;broken",
            "--agency",
            "MTA",
        ])
        .unwrap();

        assert_eq!(cli.input, PathBuf::from("feed.zip"));
        assert!(cli.config.is_none());

        let options = cli.convert_options().unwrap();
        assert!(options.add_missing_stops);
        assert_eq!(options.stop_search_radius, MAX_STOP_SEARCH_RADIUS_M);
        assert_eq!(options.route_types, Some(vec![3, 11]));
        assert_eq!(options.agency_id.as_deref(), Some("MTA"));
        assert_eq!(options.relation_tags.len(), 2);
        assert_eq!(options.relation_tags.get("network"), Some("Metro"));
    }

    #[test]
    fn command_line_defaults_and_errors() {
        let cli = CliOptions::try_parse_from(["gtfs-to-osm", "-i", "a.zip", "-o", "b.osc"]).unwrap();
        assert_eq!(cli.stop_search_radius, MAX_STOP_SEARCH_RADIUS_M);
        assert!(cli.convert_options().unwrap().relation_tags.is_empty());

        let cli = CliOptions::try_parse_from([
            "gtfs-to-osm",
            "-i",
            "a.zip",
            "-o",
            "b.osc",
            "--stop-search-radius",
            "-3",
        ])
        .unwrap();
        assert!(matches!(cli.convert_options(), Err(OptionsError::NonPositiveRadius(_))));

        assert!(CliOptions::try_parse_from(["gtfs-to-osm", "-i", "a.zip"]).is_err());
    }
}
