use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::{preview, CandidateStop, ProviderError, StopIndex};
use crate::config::OverpassConfig;
use crate::geo::Coord;

/// Tags that mark a node as somewhere a bus stops
const STOP_FILTERS: &[&str] = &[
    r#"["highway"="bus_stop"]"#,
    r#"["public_transport"="platform"]"#,
];

#[derive(Debug, Clone)]
pub struct OverpassClient {
    client: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl OverpassClient {
    pub fn new(config: &OverpassConfig) -> Result<Self, ProviderError> {
        // The query carries its own server-side timeout, so the client waits a little longer
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs + 10))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// One `around` clause per distinct point and stop filter, unioned into a single query.
    pub fn build_stops_query(points: &[Coord], radius_m: f64, timeout_secs: u64) -> String {
        let mut seen = HashSet::new();
        let mut clauses = Vec::new();

        for point in points {
            let around = format!("(around:{},{},{})", radius_m, point.lat, point.lon);
            if !seen.insert(around.clone()) {
                continue;
            }
            for filter in STOP_FILTERS {
                clauses.push(format!("node{filter}{around};"));
            }
        }

        format!(
            r#"[out:json][timeout:{timeout_secs}];
(
{}
);
out body;"#,
            clauses.join("\n")
        )
    }

    /// Execute a single HTTP request
    async fn execute_request(&self, query: &str) -> Result<String, ProviderError> {
        tracing::debug!(url = %self.url, "Executing Overpass query");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(format!("data={}", urlencoding::encode(query)))
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = %status, body_preview = %preview(&text, 200), "Overpass API error");
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                body: preview(&text, 200),
            });
        }

        Ok(text)
    }
}

impl StopIndex for OverpassClient {
    async fn stops_near(
        &self,
        points: &[Coord],
        radius_m: f64,
    ) -> Result<Vec<CandidateStop>, ProviderError> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let query = Self::build_stops_query(points, radius_m, self.timeout_secs);
        let text = self.execute_request(&query).await?;
        parse_stops_response(&text)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Clone, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    element_type: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    tags: Option<HashMap<String, String>>,
}

fn parse_stops_response(text: &str) -> Result<Vec<CandidateStop>, ProviderError> {
    let parsed: OverpassResponse = serde_json::from_str(text).map_err(|e| {
        tracing::warn!(
            error = %e,
            body_preview = %preview(text, 500),
            "Failed to parse Overpass response"
        );
        ProviderError::ParseError(e.to_string())
    })?;

    Ok(parsed
        .elements
        .into_iter()
        .filter(|elem| elem.element_type == "node")
        .filter_map(|elem| match (elem.lat, elem.lon) {
            (Some(lat), Some(lon)) => Some(CandidateStop {
                id: elem.id,
                lat,
                lon,
                tags: elem.tags.unwrap_or_default(),
            }),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_batches_every_point() {
        let points = [
            Coord::new(40.7128, -74.006),
            Coord::new(40.7228, -74.016),
            Coord::new(40.7128, -74.006),
        ];
        let query = OverpassClient::build_stops_query(&points, 10.0, 25);

        assert!(query.starts_with("[out:json][timeout:25];"));
        assert!(query.contains(r#"node["highway"="bus_stop"](around:10,40.7128,-74.006);"#));
        assert!(query.contains(r#"node["public_transport"="platform"](around:10,40.7228,-74.016);"#));
        // The repeated point adds nothing
        assert_eq!(query.matches("around:").count(), 4);
        assert!(query.trim_end().ends_with("out body;"));
    }

    #[test]
    fn parses_nodes_and_skips_the_rest() {
        let body = r#"{
            "version": 0.6,
            "elements": [
                {"type": "node", "id": 101, "lat": 40.7128, "lon": -74.006, "tags": {"highway": "bus_stop", "name": "Main"}},
                {"type": "node", "id": 102, "lat": 40.7228, "lon": -74.016},
                {"type": "way", "id": 7, "nodes": [1, 2]}
            ]
        }"#;
        let stops = parse_stops_response(body).unwrap();

        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].id, 101);
        assert_eq!(stops[0].tags.get("name").map(String::as_str), Some("Main"));
        assert!(stops[1].tags.is_empty());
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_stops_response("<html>busy</html>").unwrap_err();
        assert!(matches!(err, ProviderError::ParseError(_)));
        assert!(!err.is_rate_limited());
    }
}
