//! Route and route_master relation assembly.

use tracing::{debug, info};

use crate::config::ConvertOptions;
use crate::feed::{Feed, Route};
use crate::geo::Direction;
use crate::naming::{osm_colour, osm_route_type, route_name};
use crate::osm::{ChangesetDocument, ElementError, IdAllocator, MemberType, OsmRelation};
use crate::patterns::{deduplicate, extract_patterns, PatternFilter, TripPattern};
use crate::providers::{MapMatcher, StopIndex};
use crate::resolve::{ShapeResolver, StopResolver, SyntheticStops};

/// Counts for one conversion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    pub routes: usize,
    pub trip_patterns: usize,
    pub unique_patterns: usize,
    pub route_relations: usize,
    pub route_masters: usize,
    pub placeholder_stops: usize,
}

/// Route relations sharing one `ref`, in creation order.
#[derive(Debug)]
struct Variants {
    reference: String,
    route: Route,
    relation_ids: Vec<i64>,
}

/// Accumulates every relation of a run. Ids, placeholder stops and the
/// ref grouping all live here, so one builder is one run.
pub struct RelationBuilder<S, M> {
    options: ConvertOptions,
    stops: StopResolver<S>,
    ways: ShapeResolver<M>,
    ids: IdAllocator,
    synthetic: SyntheticStops,
    routes: Vec<OsmRelation>,
    masters: Vec<OsmRelation>,
    variants: Vec<Variants>,
    summary: ConversionSummary,
}

impl<S: StopIndex, M: MapMatcher> RelationBuilder<S, M> {
    pub fn new(options: ConvertOptions, stops: StopResolver<S>, ways: ShapeResolver<M>) -> Self {
        Self {
            options,
            stops,
            ways,
            ids: IdAllocator::new(),
            synthetic: SyntheticStops::default(),
            routes: Vec::new(),
            masters: Vec::new(),
            variants: Vec::new(),
            summary: ConversionSummary::default(),
        }
    }

    /// One route relation per distinct stop pattern of every route the filter accepts.
    pub async fn build_relations(
        &mut self,
        feed: &Feed,
        filter: &PatternFilter,
    ) -> Result<(), ElementError> {
        for route_patterns in extract_patterns(feed, filter) {
            let route = route_patterns.route;
            let total = route_patterns.patterns.len();
            let unique = deduplicate(route_patterns.patterns);

            self.summary.routes += 1;
            self.summary.trip_patterns += total;
            self.summary.unique_patterns += unique.len();
            info!(
                route = %route.id,
                trips = total,
                variants = unique.len(),
                "Building route relations"
            );

            for pattern in &unique {
                self.build_route_relation(feed, route, pattern).await?;
            }
        }
        Ok(())
    }

    async fn build_route_relation(
        &mut self,
        feed: &Feed,
        route: &Route,
        pattern: &TripPattern,
    ) -> Result<i64, ElementError> {
        let locations = feed.stop_locations(&pattern.stops);
        let reference = route.reference().to_string();

        let direction = match (locations.first(), locations.last()) {
            (Some(first), Some(last)) if self.options.add_route_direction && locations.len() >= 2 => {
                Direction::between(first.coord(), last.coord())
            }
            _ => None,
        };

        let mut relation = OsmRelation::new(self.ids.next_id());
        relation.tags.add("type", "route")?;
        relation.tags.add("public_transport:version", "2")?;
        relation.tags.add("route", osm_route_type(route.route_type))?;
        relation.tags.add("ref", &reference)?;
        relation
            .tags
            .add("name", &route_name(&reference, route.long_name.as_deref(), direction))?;
        self.add_colour_and_extra_tags(&mut relation, route)?;

        if !self.options.exclude_stops {
            let matched = self.stops.resolve(&locations, &mut self.synthetic).await;
            for stop in &matched {
                relation.add_member(MemberType::Node, stop.id(), "platform");
            }
        }

        if !self.options.exclude_routes {
            let shape = pattern
                .shape_id
                .as_ref()
                .map(|id| feed.shape(id))
                .unwrap_or(&[]);
            for way_id in self.ways.resolve(shape).await {
                relation.add_member(MemberType::Way, way_id, "");
            }
        }

        debug!(
            relation = relation.id,
            trip = %pattern.trip_id,
            stops = relation.members_of(MemberType::Node).count(),
            ways = relation.members_of(MemberType::Way).count(),
            "Built route relation"
        );

        // Extra tags may have replaced the ref, and masters group by the final value
        let master_ref = relation.tags.get("ref").unwrap_or(reference.as_str()).to_string();
        let id = relation.id;
        self.record_variant(master_ref, route, id);
        self.routes.push(relation);
        self.summary.route_relations += 1;
        Ok(id)
    }

    fn record_variant(&mut self, reference: String, route: &Route, relation_id: i64) {
        match self.variants.iter_mut().find(|v| v.reference == reference) {
            Some(variants) => variants.relation_ids.push(relation_id),
            None => self.variants.push(Variants {
                reference,
                route: route.clone(),
                relation_ids: vec![relation_id],
            }),
        }
    }

    /// One route_master per distinct `ref`, taking its metadata from the first
    /// route seen with that ref. Call after [`Self::build_relations`].
    pub fn build_route_masters(&mut self) -> Result<(), ElementError> {
        let variants = std::mem::take(&mut self.variants);

        for group in &variants {
            let route = &group.route;
            let mut master = OsmRelation::new(self.ids.next_id());
            master.tags.add("type", "route_master")?;
            let mode = if self.options.mode_aware_route_master {
                osm_route_type(route.route_type)
            } else {
                "bus"
            };
            master.tags.add("route_master", mode)?;
            master.tags.add("ref", &group.reference)?;
            master
                .tags
                .add("name", &route_name(&group.reference, route.long_name.as_deref(), None))?;
            self.add_colour_and_extra_tags(&mut master, route)?;

            for relation_id in &group.relation_ids {
                master.add_member(MemberType::Relation, *relation_id, "");
            }

            debug!(
                relation = master.id,
                reference = %group.reference,
                variants = group.relation_ids.len(),
                "Built route master"
            );
            self.masters.push(master);
            self.summary.route_masters += 1;
        }

        self.variants = variants;
        Ok(())
    }

    fn add_colour_and_extra_tags(
        &self,
        relation: &mut OsmRelation,
        route: &Route,
    ) -> Result<(), ElementError> {
        if let Some(colour) = route.color.as_deref().and_then(osm_colour) {
            relation.tags.add("colour", &colour)?;
        }
        for (key, value) in self.options.relation_tags.iter() {
            relation.tags.set(key, value)?;
        }
        Ok(())
    }

    pub fn relations(&self) -> impl Iterator<Item = &OsmRelation> {
        self.routes.iter().chain(&self.masters)
    }

    pub fn synthetic_stops(&self) -> &SyntheticStops {
        &self.synthetic
    }

    pub fn summary(&self) -> ConversionSummary {
        ConversionSummary {
            placeholder_stops: self.synthetic.len(),
            ..self.summary
        }
    }

    /// Placeholder stops first, then route relations, then route masters.
    pub fn into_document(self, generator: impl Into<String>) -> ChangesetDocument {
        let mut document = ChangesetDocument::new(generator);
        document.new_stops = self.synthetic.into_nodes();
        document.relations = self.routes;
        document.relations.extend(self.masters);
        document
    }
}
