//! External services: the Overpass stop index and the Valhalla map matcher.
//!
//! Clients make exactly one request per call. Retrying is up to the caller,
//! through [`with_retry`], since each resolver retries on different errors.

pub mod overpass;
pub mod valhalla;

use std::collections::HashMap;
use std::future::Future;

use tracing::warn;

use crate::config::RetryPolicy;
use crate::geo::Coord;

pub use overpass::OverpassClient;
pub use valhalla::ValhallaClient;

/// An existing stop-like node returned by the stop index.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateStop {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub tags: HashMap<String, String>,
}

impl CandidateStop {
    pub fn coord(&self) -> Coord {
        Coord::new(self.lat, self.lon)
    }
}

/// Spatial lookup of transit stops already in OSM.
#[allow(async_fn_in_trait)]
pub trait StopIndex {
    /// All stop-like nodes within `radius_m` of any of `points`, in one request.
    async fn stops_near(
        &self,
        points: &[Coord],
        radius_m: f64,
    ) -> Result<Vec<CandidateStop>, ProviderError>;
}

/// Snaps a polyline onto the road network.
#[allow(async_fn_in_trait)]
pub trait MapMatcher {
    /// The matched edges in travel order, each with its OSM way id when known.
    async fn match_edges(
        &self,
        shape: &[Coord],
        costing: &str,
    ) -> Result<Vec<Option<i64>>, ProviderError>;
}

/// Runs `op` until it succeeds, fails with an error `should_retry` rejects, or
/// `policy.max_retries` retries are spent. Waits `policy.delay()` between attempts.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    service: &str,
    should_retry: impl Fn(&ProviderError) -> bool,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if should_retry(&e) && retries < policy.max_retries => {
                retries += 1;
                warn!(
                    service,
                    attempt = retries,
                    max_retries = policy.max_retries,
                    delay_secs = policy.delay_secs,
                    error = %e,
                    "Transient error, will retry"
                );
                tokio::time::sleep(policy.delay()).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// 429 Too Many Requests and 504 Gateway Timeout: the service is busy, not broken
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::HttpStatus { status: 429 | 504, .. })
    }

    /// Anything but an explicit HTTP error status
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::NetworkError(_) | ProviderError::ParseError(_) | ProviderError::Malformed(_)
        )
    }
}

/// First `limit` characters of a response body, for logs and errors.
pub(crate) fn preview(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            delay_secs: 0.0,
        }
    }

    fn status(status: u16) -> ProviderError {
        ProviderError::HttpStatus {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn classification() {
        assert!(status(429).is_rate_limited());
        assert!(status(504).is_rate_limited());
        assert!(!status(500).is_rate_limited());
        assert!(!status(400).is_transient());
        assert!(ProviderError::Malformed("no edges".into()).is_transient());
        assert!(ProviderError::NetworkError("reset".into()).is_transient());
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Cell::new(0);
        let result = with_retry(&instant(3), "test", ProviderError::is_rate_limited, || {
            calls.set(calls.get() + 1);
            let attempt = calls.get();
            async move {
                if attempt < 3 {
                    Err(status(429))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = Cell::new(0);
        let result: Result<(), _> =
            with_retry(&instant(3), "test", ProviderError::is_rate_limited, || {
                calls.set(calls.get() + 1);
                async { Err(status(504)) }
            })
            .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> =
            with_retry(&instant(3), "test", ProviderError::is_rate_limited, || {
                calls.set(calls.get() + 1);
                async { Err(status(500)) }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::HttpStatus { status: 500, .. })));
        assert_eq!(calls.get(), 1);
    }
}
