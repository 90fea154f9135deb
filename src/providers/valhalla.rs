use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{preview, MapMatcher, ProviderError};
use crate::config::ValhallaConfig;
use crate::geo::Coord;

#[derive(Debug, Clone)]
pub struct ValhallaClient {
    client: reqwest::Client,
    url: String,
}

impl ValhallaClient {
    pub fn new(config: &ValhallaConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

impl MapMatcher for ValhallaClient {
    async fn match_edges(
        &self,
        shape: &[Coord],
        costing: &str,
    ) -> Result<Vec<Option<i64>>, ProviderError> {
        let request = TraceRequest::new(shape, costing);
        tracing::debug!(url = %self.url, points = shape.len(), costing, "Executing map-matching request");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            // Valhalla reports unmatchable shapes as 400 with a JSON error; treat it like any other
            // unusable answer so the shape gets its retries.
            tracing::warn!(status = %status, body_preview = %preview(&text, 200), "Valhalla error");
            return Err(ProviderError::Malformed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                preview(&text, 200)
            )));
        }

        parse_edges(&text)
    }
}

#[derive(Debug, Serialize)]
struct TraceRequest<'a> {
    shape: Vec<ShapePoint>,
    costing: &'a str,
    shape_match: &'static str,
    filters: AttributeFilter,
}

#[derive(Debug, Serialize)]
struct ShapePoint {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Serialize)]
struct AttributeFilter {
    attributes: Vec<&'static str>,
    action: &'static str,
}

impl<'a> TraceRequest<'a> {
    fn new(shape: &[Coord], costing: &'a str) -> Self {
        Self {
            shape: shape
                .iter()
                .map(|c| ShapePoint { lat: c.lat, lon: c.lon })
                .collect(),
            costing,
            shape_match: "map_snap",
            filters: AttributeFilter {
                attributes: vec!["edge.way_id"],
                action: "include",
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TraceResponse {
    edges: Option<Vec<Edge>>,
}

#[derive(Debug, Deserialize)]
struct Edge {
    way_id: Option<i64>,
}

fn parse_edges(text: &str) -> Result<Vec<Option<i64>>, ProviderError> {
    let parsed: TraceResponse = serde_json::from_str(text).map_err(|e| {
        tracing::error!(
            error = %e,
            body_preview = %preview(text, 500),
            "Failed to parse Valhalla response"
        );
        ProviderError::ParseError(e.to_string())
    })?;

    let edges = parsed
        .edges
        .ok_or_else(|| ProviderError::Malformed("response has no edges".to_string()))?;

    Ok(edges.into_iter().map(|edge| edge.way_id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let shape = [Coord::new(40.7128, -74.006), Coord::new(40.7228, -74.016)];
        let body = serde_json::to_value(TraceRequest::new(&shape, "bus")).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "shape": [
                    {"lat": 40.7128, "lon": -74.006},
                    {"lat": 40.7228, "lon": -74.016}
                ],
                "costing": "bus",
                "shape_match": "map_snap",
                "filters": {"attributes": ["edge.way_id"], "action": "include"}
            })
        );
    }

    #[test]
    fn edges_keep_order_and_gaps() {
        let edges = parse_edges(
            r#"{"edges": [{"way_id": 1}, {"way_id": 1}, {}, {"way_id": 2, "length": 0.1}], "units": "kilometers"}"#,
        )
        .unwrap();
        assert_eq!(edges, vec![Some(1), Some(1), None, Some(2)]);
    }

    #[test]
    fn missing_edges_is_malformed() {
        let err = parse_edges(r#"{"error": "no path"}"#).unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
        assert!(err.is_transient());

        let err = parse_edges("not json").unwrap_err();
        assert!(matches!(err, ProviderError::ParseError(_)));
        assert!(err.is_transient());
    }
}
