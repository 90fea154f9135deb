use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info};

use crate::config::RetryPolicy;
use crate::feed::{StopId, StopLocation};
use crate::geo::Coord;
use crate::osm::{placeholder_node_id, OsmNode, Tags};
use crate::providers::{with_retry, CandidateStop, ProviderError, StopIndex};

/// Where a GTFS stop ended up in OSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedStop {
    /// An existing node
    Existing(i64),
    /// A node created by this run, see [`SyntheticStops`]
    Placeholder(i64),
}

impl MatchedStop {
    pub fn id(&self) -> i64 {
        match self {
            MatchedStop::Existing(id) | MatchedStop::Placeholder(id) => *id,
        }
    }
}

/// Pairs stop locations with candidate nodes.
pub trait StopAssignment {
    /// One entry per stop, in input order: the chosen candidate id, if any.
    fn assign(
        &self,
        stops: &[StopLocation],
        candidates: Vec<CandidateStop>,
        radius_m: f64,
    ) -> Vec<Option<i64>>;
}

/// Walks the stops in order and gives each the nearest unclaimed candidate
/// strictly inside the radius. A candidate is claimed at most once, even by
/// the same stop: a loop that revisits a stop gets its node on the first visit
/// only, and later visits fall through to synthesis or are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyNearest;

impl StopAssignment for GreedyNearest {
    fn assign(
        &self,
        stops: &[StopLocation],
        mut pool: Vec<CandidateStop>,
        radius_m: f64,
    ) -> Vec<Option<i64>> {
        stops
            .iter()
            .map(|stop| {
                let here = stop.coord();
                let (index, _) = nearest_within(&here, &pool, radius_m)?;
                Some(pool.remove(index).id)
            })
            .collect()
    }
}

/// Index and distance of the closest candidate under `radius_m`. Ties go to the earlier one.
fn nearest_within(here: &Coord, pool: &[CandidateStop], radius_m: f64) -> Option<(usize, f64)> {
    pool.iter()
        .enumerate()
        .map(|(i, candidate)| (i, here.distance_to(&candidate.coord())))
        .filter(|(_, distance)| *distance < radius_m)
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Placeholder nodes created during a run, each emitted once however many
/// patterns reference it.
#[derive(Debug, Default)]
pub struct SyntheticStops {
    nodes: Vec<OsmNode>,
    by_stop: HashMap<StopId, i64>,
    taken: HashSet<i64>,
}

impl SyntheticStops {
    /// The placeholder id for `stop`, creating its node on first sight.
    ///
    /// Ids start from the stop id hash. When another stop already holds that
    /// id, the next free one below it is used instead.
    pub fn get_or_create(&mut self, stop: &StopLocation) -> i64 {
        if let Some(id) = self.by_stop.get(&stop.stop_id) {
            return *id;
        }

        let hashed = placeholder_node_id(stop.stop_id.as_str());
        let mut id = hashed;
        while self.taken.contains(&id) {
            id = if id <= -(i32::MAX as i64) { -1 } else { id - 1 };
        }
        if id != hashed {
            debug!(stop_id = %stop.stop_id, hashed, node_id = id, "Placeholder id already taken");
        }

        let mut node = OsmNode::new(id, stop.lat, stop.lon);
        node.tags = Tags::from_iter([
            ("name", stop.name.as_str()),
            ("public_transport", "platform"),
            ("highway", "bus_stop"),
        ]);
        debug!(stop_id = %stop.stop_id, node_id = id, "Created placeholder stop");

        self.taken.insert(id);
        self.by_stop.insert(stop.stop_id.clone(), id);
        self.nodes.push(node);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[OsmNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<OsmNode> {
        self.nodes
    }
}

pub struct StopResolver<S> {
    index: S,
    radius_m: f64,
    synthesize_missing: bool,
    policy: RetryPolicy,
    strategy: Box<dyn StopAssignment>,
}

impl<S: StopIndex> StopResolver<S> {
    pub fn new(index: S, radius_m: f64, synthesize_missing: bool, policy: RetryPolicy) -> Self {
        Self {
            index,
            radius_m,
            synthesize_missing,
            policy,
            strategy: Box::new(GreedyNearest),
        }
    }

    pub fn index(&self) -> &S {
        &self.index
    }

    pub fn with_strategy(mut self, strategy: impl StopAssignment + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Resolves stops in order. Unmatched stops become placeholders when
    /// synthesis is on and are dropped otherwise.
    ///
    /// Issues at most one stop index query. If that query fails for good the
    /// failure is logged and nothing is resolved.
    pub async fn resolve(
        &self,
        stops: &[StopLocation],
        synthetic: &mut SyntheticStops,
    ) -> Vec<MatchedStop> {
        if stops.is_empty() {
            return Vec::new();
        }

        let points: Vec<Coord> = stops.iter().map(StopLocation::coord).collect();
        let candidates = match self.query(&points).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(stops = stops.len(), error = %e, "Stop lookup failed, skipping these stops");
                return Vec::new();
            }
        };
        debug!(stops = stops.len(), candidates = candidates.len(), "Fetched candidate stops");

        let assignments = self.strategy.assign(stops, candidates, self.radius_m);

        let mut matched = Vec::with_capacity(stops.len());
        let mut dropped = 0;
        for (stop, assignment) in stops.iter().zip(assignments) {
            match assignment {
                Some(id) => matched.push(MatchedStop::Existing(id)),
                None if self.synthesize_missing => {
                    matched.push(MatchedStop::Placeholder(synthetic.get_or_create(stop)))
                }
                None => {
                    debug!(stop_id = %stop.stop_id, "No OSM stop nearby, dropping");
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            info!(dropped, "Stops without an OSM match were left out");
        }

        matched
    }

    async fn query(&self, points: &[Coord]) -> Result<Vec<CandidateStop>, ProviderError> {
        let index = &self.index;
        let radius_m = self.radius_m;
        with_retry(&self.policy, "overpass", ProviderError::is_rate_limited, move || {
            index.stops_near(points, radius_m)
        })
        .await
    }
}
