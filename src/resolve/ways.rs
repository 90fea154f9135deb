use tracing::{debug, error};

use crate::config::RetryPolicy;
use crate::geo::Coord;
use crate::providers::{with_retry, MapMatcher, ProviderError};

pub struct ShapeResolver<M> {
    matcher: M,
    costing: String,
    policy: RetryPolicy,
}

impl<M: MapMatcher> ShapeResolver<M> {
    pub fn new(matcher: M, costing: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            matcher,
            costing: costing.into(),
            policy,
        }
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    /// Way ids along `shape`, in travel order. Empty when the shape has fewer
    /// than two points or the matcher never gives a usable answer.
    pub async fn resolve(&self, shape: &[Coord]) -> Vec<i64> {
        if shape.len() < 2 {
            debug!(points = shape.len(), "Shape too short to match");
            return Vec::new();
        }

        let matcher = &self.matcher;
        let costing = self.costing.as_str();
        let result = with_retry(&self.policy, "valhalla", ProviderError::is_transient, move || {
            matcher.match_edges(shape, costing)
        })
        .await;

        match result {
            Ok(edges) => {
                let ways = collapse_way_ids(edges);
                debug!(points = shape.len(), ways = ways.len(), "Matched shape");
                ways
            }
            Err(e) => {
                error!(
                    points = shape.len(),
                    attempts = self.policy.max_retries + 1,
                    error = %e,
                    "Map matching failed, route gets no ways"
                );
                Vec::new()
            }
        }
    }
}

/// Drops edges without a way id and records a way once per consecutive run.
/// A way that comes back later, as on a loop, is recorded again.
pub fn collapse_way_ids(edges: impl IntoIterator<Item = Option<i64>>) -> Vec<i64> {
    let mut ways: Vec<i64> = Vec::new();
    for way_id in edges.into_iter().flatten() {
        if ways.last() != Some(&way_id) {
            ways.push(way_id);
        }
    }
    ways
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeMatcher {
        script: RefCell<VecDeque<Result<Vec<Option<i64>>, ProviderError>>>,
        calls: Cell<usize>,
        costing: RefCell<Option<String>>,
    }

    impl FakeMatcher {
        fn scripted(responses: Vec<Result<Vec<Option<i64>>, ProviderError>>) -> Self {
            Self {
                script: RefCell::new(responses.into()),
                ..Default::default()
            }
        }
    }

    impl MapMatcher for FakeMatcher {
        async fn match_edges(
            &self,
            _shape: &[Coord],
            costing: &str,
        ) -> Result<Vec<Option<i64>>, ProviderError> {
            self.calls.set(self.calls.get() + 1);
            *self.costing.borrow_mut() = Some(costing.to_string());
            self.script
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Malformed("no edges".into())))
        }
    }

    fn instant(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            delay_secs: 0.0,
        }
    }

    fn line() -> Vec<Coord> {
        vec![Coord::new(40.7128, -74.006), Coord::new(40.7228, -74.016)]
    }

    #[test]
    fn collapses_consecutive_repeats_only() {
        assert_eq!(
            collapse_way_ids([Some(1), Some(1), Some(2), Some(2), Some(1), Some(3)]),
            vec![1, 2, 1, 3]
        );
        assert_eq!(collapse_way_ids([None, Some(5), None, Some(5), Some(6)]), vec![5, 6]);
        assert!(collapse_way_ids(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn resolves_way_ids_in_order() {
        let matcher = FakeMatcher::scripted(vec![Ok(vec![Some(10), Some(10), Some(11), Some(10)])]);
        let resolver = ShapeResolver::new(matcher, "bus", instant(3));

        assert_eq!(resolver.resolve(&line()).await, vec![10, 11, 10]);
        assert_eq!(resolver.matcher.calls.get(), 1);
        assert_eq!(resolver.matcher.costing.borrow().as_deref(), Some("bus"));
    }

    #[tokio::test]
    async fn short_shapes_are_not_sent() {
        let resolver = ShapeResolver::new(FakeMatcher::default(), "bus", instant(3));

        assert!(resolver.resolve(&[]).await.is_empty());
        assert!(resolver.resolve(&line()[..1]).await.is_empty());
        assert_eq!(resolver.matcher.calls.get(), 0);
    }

    #[tokio::test]
    async fn malformed_responses_are_retried() {
        let matcher = FakeMatcher::scripted(vec![
            Err(ProviderError::Malformed("no edges".into())),
            Err(ProviderError::NetworkError("connection reset".into())),
            Ok(vec![Some(7)]),
        ]);
        let resolver = ShapeResolver::new(matcher, "bus", instant(3));

        assert_eq!(resolver.resolve(&line()).await, vec![7]);
        assert_eq!(resolver.matcher.calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_with_no_ways() {
        let resolver = ShapeResolver::new(FakeMatcher::default(), "auto", instant(2));

        assert!(resolver.resolve(&line()).await.is_empty());
        assert_eq!(resolver.matcher.calls.get(), 3);
    }
}
