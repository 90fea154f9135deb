//! Tag values derived from GTFS route fields.

use crate::geo::Direction;

/// Maps a GTFS `route_type` code to the OSM `route=*` value. Unknown codes are buses.
pub fn osm_route_type(route_type: Option<u16>) -> &'static str {
    match route_type {
        Some(0) => "tram",
        Some(1) => "subway",
        Some(2) => "train",
        Some(3) => "bus",
        Some(4) => "ferry",
        Some(5) | Some(11) => "trolleybus",
        Some(6) => "cable_car",
        Some(7) => "gondola",
        Some(12) => "monorail",
        _ => "bus",
    }
}

/// Turns a GTFS `route_color` into an OSM `colour` value (`#RRGGBB`).
/// Anything but 3 or 6 hex digits, with or without a leading `#`, yields `None`.
pub fn osm_colour(raw: &str) -> Option<String> {
    let hex = raw.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);

    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    match hex.len() {
        6 => Some(format!("#{hex}")),
        3 => {
            let expanded: String = hex.chars().flat_map(|c| [c, c]).collect();
            Some(format!("#{expanded}"))
        }
        _ => None,
    }
}

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("rd", "Road"),
    ("st", "Street"),
    ("ave", "Avenue"),
    ("av", "Avenue"),
    ("blvd", "Boulevard"),
    ("dr", "Drive"),
    ("hwy", "Highway"),
    ("pkwy", "Parkway"),
    ("ln", "Lane"),
    ("ct", "Court"),
    ("pl", "Place"),
    ("sq", "Square"),
    ("ctr", "Center"),
    ("sta", "Station"),
];

/// Cleans up a GTFS name for use in an OSM `name` tag.
///
/// Underscores become spaces, runs of whitespace collapse, trailing `,` and `;`
/// are dropped and common street abbreviations are spelled out. Separators such
/// as `/` or `-` are left alone.
pub fn format_name(raw: &str) -> String {
    let cleaned = raw.replace('_', " ");
    let cleaned = cleaned.trim().trim_end_matches([',', ';', ' ']);

    cleaned
        .split_whitespace()
        .map(expand_abbreviation)
        .collect::<Vec<_>>()
        .join(" ")
}

fn expand_abbreviation(word: &str) -> String {
    let bare = word.trim_end_matches('.');
    let lower = bare.to_ascii_lowercase();

    ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| *abbr == lower)
        .map(|(_, full)| full.to_string())
        .unwrap_or_else(|| word.to_string())
}

/// `Route {ref} {long name} {direction}`, skipping empty parts.
pub fn route_name(reference: &str, long_name: Option<&str>, direction: Option<Direction>) -> String {
    let mut parts = vec!["Route".to_string()];

    if !reference.trim().is_empty() {
        parts.push(reference.trim().to_string());
    }
    if let Some(long_name) = long_name.map(format_name).filter(|n| !n.is_empty()) {
        parts.push(long_name);
    }
    if let Some(direction) = direction {
        parts.push(direction.as_str().to_string());
    }

    parts.join(" ")
}
