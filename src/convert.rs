//! End-to-end conversion: GTFS archive in, osmChange file out.

use std::path::Path;

use tracing::info;

use crate::builder::{ConversionSummary, RelationBuilder};
use crate::config::{Config, ConvertOptions, OptionsError};
use crate::feed::{Feed, FeedError};
use crate::osm::{ChangesetDocument, ElementError};
use crate::patterns::PatternFilter;
use crate::providers::{MapMatcher, OverpassClient, ProviderError, StopIndex, ValhallaClient};
use crate::resolve::{ShapeResolver, StopResolver};

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Failed to load GTFS feed: {0}")]
    Feed(#[from] FeedError),
    #[error("Invalid options: {0}")]
    Options(#[from] OptionsError),
    #[error("Failed to set up service client: {0}")]
    Provider(#[from] ProviderError),
    #[error("Failed to build relations: {0}")]
    Element(#[from] ElementError),
    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Converts the archive at `gtfs_path` and writes the osmChange document to `osm_path`.
///
/// Nothing is written unless the whole conversion succeeds.
pub async fn convert_gtfs_to_osm(
    gtfs_path: &Path,
    osm_path: &Path,
    options: &ConvertOptions,
    config: &Config,
) -> Result<ConversionSummary, ConvertError> {
    let options = options.clone().validate()?;
    let filter = options.pattern_filter()?;
    let feed = Feed::load(gtfs_path)?;

    let stops = StopResolver::new(
        OverpassClient::new(&config.overpass)?,
        options.stop_search_radius,
        options.add_missing_stops,
        config.retry.stops,
    );
    let ways = ShapeResolver::new(
        ValhallaClient::new(&config.valhalla)?,
        config.valhalla.costing.as_str(),
        config.retry.ways,
    );

    let (document, summary) =
        convert_feed(&feed, options, &filter, stops, ways, &config.generator.0).await?;

    let xml = document.to_xml();
    std::fs::write(osm_path, xml).map_err(|source| ConvertError::Write {
        path: osm_path.display().to_string(),
        source,
    })?;
    info!(path = %osm_path.display(), "Wrote osmChange document");

    Ok(summary)
}

/// Builds the full document for an already loaded feed with the given resolvers.
pub async fn convert_feed<S: StopIndex, M: MapMatcher>(
    feed: &Feed,
    options: ConvertOptions,
    filter: &PatternFilter,
    stops: StopResolver<S>,
    ways: ShapeResolver<M>,
    generator: &str,
) -> Result<(ChangesetDocument, ConversionSummary), ConvertError> {
    let mut builder = RelationBuilder::new(options, stops, ways);
    builder.build_relations(feed, filter).await?;
    builder.build_route_masters()?;

    let summary = builder.summary();
    info!(
        routes = summary.routes,
        trips = summary.trip_patterns,
        unique_patterns = summary.unique_patterns,
        route_relations = summary.route_relations,
        route_masters = summary.route_masters,
        new_stops = summary.placeholder_stops,
        "Conversion complete"
    );

    Ok((builder.into_document(generator), summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_archive_writes_nothing() {
        let dir = std::env::temp_dir().join(format!("gtfs-to-osm-missing-{}", std::process::id()));
        let output = dir.join("out.osc");

        let result = convert_gtfs_to_osm(
            &dir.join("nope.zip"),
            &output,
            &ConvertOptions::default(),
            &Config::default(),
        )
        .await;

        assert!(matches!(result, Err(ConvertError::Feed(FeedError::NotFound(_)))));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn invalid_options_fail_before_loading() {
        let options = ConvertOptions {
            exclude_stops: true,
            exclude_routes: true,
            ..Default::default()
        };
        let result = convert_gtfs_to_osm(
            Path::new("does-not-matter.zip"),
            Path::new("out.osc"),
            &options,
            &Config::default(),
        )
        .await;

        assert!(matches!(
            result,
            Err(ConvertError::Options(OptionsError::NothingToConvert))
        ));
    }
}
