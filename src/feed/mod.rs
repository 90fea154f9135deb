//! GTFS archive loading.
//!
//! The archive is read once into typed tables. Identifiers stay opaque strings,
//! coordinates are `f64` and sequence numbers integers, so nothing downstream
//! has to guess at column types.

mod records;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::geo::Coord;
use records::{AgencyRecord, RouteRecord, ShapeRecord, StopRecord, StopTimeRecord, TripRecord};

pub use records::{
    parse_route_type, Agency, Route, RouteId, ShapeId, Stop, StopId, StopLocation, StopTime,
    Trip, TripId,
};

#[derive(Debug, Clone, Default)]
pub struct Feed {
    pub agencies: Vec<Agency>,
    /// In table order
    pub routes: Vec<Route>,
    /// In table order
    pub trips: Vec<Trip>,
    pub stops: HashMap<StopId, Stop>,
    /// Per trip, sorted by `stop_sequence`; ties keep table order
    pub stop_times: HashMap<TripId, Vec<StopTime>>,
    /// Per shape, sorted by `shape_pt_sequence`
    pub shapes: HashMap<ShapeId, Vec<Coord>>,
}

impl Feed {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FeedError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FeedError::NotFound(path.display().to_string())
            } else {
                FeedError::Io(e.to_string())
            }
        })?;

        info!(path = %path.display(), "Loading GTFS feed");
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, FeedError> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| FeedError::InvalidArchive(e.to_string()))?;

        let mut feed = Feed::default();

        if let Some(records) = read_table::<_, AgencyRecord>(&mut archive, "agency.txt")? {
            feed.agencies = records
                .into_iter()
                .map(|rec| Agency {
                    id: rec.agency_id,
                    name: rec.agency_name,
                })
                .collect();
        }

        feed.routes = required_table::<_, RouteRecord>(&mut archive, "routes.txt")?
            .into_iter()
            .map(Route::from)
            .collect();

        feed.trips = required_table::<_, TripRecord>(&mut archive, "trips.txt")?
            .into_iter()
            .map(|rec| Trip {
                id: rec.trip_id,
                route_id: rec.route_id,
                shape_id: rec.shape_id,
            })
            .collect();

        for rec in required_table::<_, StopRecord>(&mut archive, "stops.txt")? {
            let (lat, lon) = match (rec.stop_lat, rec.stop_lon) {
                (Some(lat), Some(lon)) => (lat, lon),
                _ => {
                    debug!(stop_id = %rec.stop_id, "Skipping stop without coordinates");
                    continue;
                }
            };
            feed.stops.insert(
                rec.stop_id.clone(),
                Stop {
                    id: rec.stop_id,
                    name: rec.stop_name.unwrap_or_default(),
                    pos: Coord::new(lat, lon),
                },
            );
        }

        for rec in required_table::<_, StopTimeRecord>(&mut archive, "stop_times.txt")? {
            feed.stop_times
                .entry(rec.trip_id)
                .or_insert_with(Vec::new)
                .push(StopTime {
                    stop_id: rec.stop_id,
                    stop_sequence: rec.stop_sequence,
                });
        }
        for stop_times in feed.stop_times.values_mut() {
            // Stable, so equal sequence numbers keep their table order
            stop_times.sort_by_key(|st| st.stop_sequence);
        }

        match read_table::<_, ShapeRecord>(&mut archive, "shapes.txt")? {
            Some(records) => {
                let mut points: HashMap<ShapeId, Vec<(u32, Coord)>> = HashMap::new();
                for rec in records {
                    points
                        .entry(rec.shape_id)
                        .or_insert_with(Vec::new)
                        .push((rec.shape_pt_sequence, Coord::new(rec.shape_pt_lat, rec.shape_pt_lon)));
                }
                feed.shapes = points
                    .into_iter()
                    .map(|(id, mut pts)| {
                        pts.sort_by_key(|(seq, _)| *seq);
                        (id, pts.into_iter().map(|(_, pt)| pt).collect())
                    })
                    .collect();
            }
            None => warn!("Feed has no shapes.txt, routes will have no ways"),
        }

        info!(
            agencies = feed.agencies.len(),
            routes = feed.routes.len(),
            trips = feed.trips.len(),
            stops = feed.stops.len(),
            shapes = feed.shapes.len(),
            "Loaded GTFS feed"
        );

        Ok(feed)
    }

    /// Joins stop ids against the stops table, keeping the input order and any repeats.
    /// Ids missing from the table are dropped.
    pub fn stop_locations(&self, stop_ids: &[StopId]) -> Vec<StopLocation> {
        stop_ids
            .iter()
            .filter_map(|id| match self.stops.get(id) {
                Some(stop) => Some(StopLocation {
                    stop_id: stop.id.clone(),
                    lat: stop.pos.lat,
                    lon: stop.pos.lon,
                    name: stop.name.clone(),
                }),
                None => {
                    debug!(stop_id = %id, "Stop referenced by stop_times is not in stops.txt");
                    None
                }
            })
            .collect()
    }

    /// Shape geometry in sequence order, empty when the shape is unknown.
    pub fn shape(&self, shape_id: &ShapeId) -> &[Coord] {
        self.shapes.get(shape_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Finds an archive entry by base name, so feeds zipped inside a folder still load.
fn find_entry<R: Read + Seek>(archive: &ZipArchive<R>, file: &str) -> Option<String> {
    archive
        .file_names()
        .find(|name| !name.starts_with("__MACOSX") && name.rsplit('/').next() == Some(file))
        .map(str::to_string)
}

fn read_table<R: Read + Seek, T: DeserializeOwned>(
    archive: &mut ZipArchive<R>,
    file: &str,
) -> Result<Option<Vec<T>>, FeedError> {
    let Some(name) = find_entry(archive, file) else {
        return Ok(None);
    };

    let entry = archive
        .by_name(&name)
        .map_err(|e| FeedError::InvalidArchive(e.to_string()))?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(entry);

    let mut rows = Vec::new();
    for rec in reader.deserialize() {
        let rec: T = rec.map_err(|e| FeedError::Csv {
            file: file.to_string(),
            message: e.to_string(),
        })?;
        rows.push(rec);
    }

    debug!(file, rows = rows.len(), "Read table");
    Ok(Some(rows))
}

fn required_table<R: Read + Seek, T: DeserializeOwned>(
    archive: &mut ZipArchive<R>,
    file: &str,
) -> Result<Vec<T>, FeedError> {
    read_table(archive, file)?.ok_or_else(|| FeedError::MissingTable(file.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("GTFS feed not found: {0}")]
    NotFound(String),
    #[error("Failed to read GTFS feed: {0}")]
    Io(String),
    #[error("Not a valid GTFS archive: {0}")]
    InvalidArchive(String),
    #[error("GTFS feed is missing required file {0}")]
    MissingTable(String),
    #[error("Malformed row in {file}: {message}")]
    Csv { file: String, message: String },
}
