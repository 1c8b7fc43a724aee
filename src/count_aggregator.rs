//! Per-artist post counts, total and tag-restricted.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use log::warn;

use crate::booru::Post;
use crate::kv_cache::generate_cache_key;
use crate::protocol::CountsResult;
use crate::query_client::QueryClient;

/// Session cache prefix shared with image resolution.
pub const QUERY_CACHE_PREFIX: &str = "api";

/// Counts distinct posts for an artist with and without filter tags.
///
/// Never fails: a query that errors falls back to the last count that
/// succeeded for the same query string, or zero.
pub struct CountAggregator {
    query_client: Arc<QueryClient>,
    last_known: Mutex<HashMap<String, usize>>,
}

impl CountAggregator {
    pub fn new(query_client: Arc<QueryClient>) -> Self {
        Self {
            query_client,
            last_known: Mutex::new(HashMap::new()),
        }
    }

    pub fn counts_for(&self, artist_name: &str, active_filter_tags: &[String]) -> CountsResult {
        let total_count = self.count_query(artist_name);
        let filtered_count = if active_filter_tags.is_empty() {
            total_count
        } else {
            let filtered_query = format!("{} {}", artist_name, active_filter_tags.join(" "));
            self.count_query(&filtered_query)
        };
        CountsResult {
            total_count,
            filtered_count,
        }
    }

    fn count_query(&self, tag_query: &str) -> usize {
        let cache_key = generate_cache_key(QUERY_CACHE_PREFIX, tag_query);
        match self.query_client.search(tag_query, &cache_key) {
            Ok(posts) => {
                let count = distinct_post_count(&posts);
                if let Ok(mut last_known) = self.last_known.lock() {
                    last_known.insert(tag_query.to_string(), count);
                }
                count
            }
            Err(error) => {
                let fallback = self
                    .last_known
                    .lock()
                    .ok()
                    .and_then(|last_known| last_known.get(tag_query).copied())
                    .unwrap_or(0);
                warn!(
                    "Count query '{}' failed: {}. Using {}",
                    tag_query, error, fallback
                );
                fallback
            }
        }
    }
}

/// Number of distinct post ids in `posts`.
pub fn distinct_post_count(posts: &[Post]) -> usize {
    posts.iter().map(|post| post.id).collect::<HashSet<_>>().len()
}

/// Renders `[filtered/total]` or `[total]`, with `+` when the total hit the result cap.
pub fn format_counts_label(counts: CountsResult, filters_active: bool, result_limit: u32) -> String {
    let capped = if counts.total_count as u64 >= u64::from(result_limit) {
        "+"
    } else {
        ""
    };
    if filters_active {
        format!(
            "[{}/{}{}]",
            counts.filtered_count, counts.total_count, capped
        )
    } else {
        format!("[{}{}]", counts.total_count, capped)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{distinct_post_count, format_counts_label, CountAggregator};
    use crate::availability::AvailabilityGate;
    use crate::booru::danbooru::DanbooruEndpoint;
    use crate::booru::test_support::{post, posts_body, FakeTransport};
    use crate::kv_cache::KeyValueCache;
    use crate::protocol::CountsResult;
    use crate::query_client::QueryClient;

    fn aggregator(transport: Arc<FakeTransport>, gate: AvailabilityGate) -> CountAggregator {
        let client = QueryClient::new(
            gate,
            KeyValueCache::session(0),
            transport,
            DanbooruEndpoint::new("https://booru.test", 1000, "order:score"),
        );
        CountAggregator::new(Arc::new(client))
    }

    fn ids(ids: &[u64]) -> String {
        let posts: Vec<_> = ids
            .iter()
            .map(|id| post(*id, Some("https://cdn.test/x.png"), "png", "s"))
            .collect();
        posts_body(&posts)
    }

    #[test]
    fn test_duplicate_ids_count_once() {
        let posts = vec![
            post(1, None, "png", "s"),
            post(1, None, "png", "s"),
            post(2, None, "png", "s"),
        ];
        assert_eq!(distinct_post_count(&posts), 2);
    }

    #[test]
    fn test_no_filter_tags_reuses_total_without_second_query() {
        let transport = Arc::new(FakeTransport::always(&ids(&[1, 1, 2])));
        let aggregator = aggregator(transport.clone(), AvailabilityGate::new());

        let counts = aggregator.counts_for("foo_bar", &[]);

        assert_eq!(
            counts,
            CountsResult {
                total_count: 2,
                filtered_count: 2
            }
        );
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_filter_tags_issue_combined_query() {
        let transport = Arc::new(FakeTransport::new());
        transport.route("foo_bar%20solo%20smile", 200, &ids(&[3]));
        transport.route("tags=foo_bar+", 200, &ids(&[1, 2, 3, 4]));
        let aggregator = aggregator(transport.clone(), AvailabilityGate::new());

        let counts =
            aggregator.counts_for("foo_bar", &["solo".to_string(), "smile".to_string()]);

        assert_eq!(counts.total_count, 4);
        assert_eq!(counts.filtered_count, 1);
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn test_failure_falls_back_to_zero_without_history() {
        let transport = Arc::new(FakeTransport::new());
        transport.set_fallback(Err("connection reset".to_string()));
        let aggregator = aggregator(transport, AvailabilityGate::new());

        assert_eq!(aggregator.counts_for("foo", &[]), CountsResult::default());
    }

    #[test]
    fn test_failure_falls_back_to_last_known_good() {
        let transport = Arc::new(FakeTransport::new());
        transport.route("tags=foo+", 200, &ids(&[1, 2, 3]));
        transport.route("foo%20solo", 200, &ids(&[2]));
        let gate = AvailabilityGate::new();
        let aggregator = aggregator(transport, gate.clone());
        let tags = vec!["solo".to_string()];
        assert_eq!(aggregator.counts_for("foo", &tags).filtered_count, 1);

        gate.set_unavailable(true);
        let counts = aggregator.counts_for("foo", &tags);

        assert_eq!(
            counts,
            CountsResult {
                total_count: 3,
                filtered_count: 1
            }
        );
    }

    #[test]
    fn test_counts_label_formats() {
        let counts = CountsResult {
            total_count: 10,
            filtered_count: 5,
        };
        assert_eq!(format_counts_label(counts, true, 1000), "[5/10]");
        assert_eq!(format_counts_label(counts, false, 1000), "[10]");

        let capped = CountsResult {
            total_count: 1000,
            filtered_count: 1000,
        };
        assert_eq!(format_counts_label(capped, false, 1000), "[1000+]");
        assert_eq!(format_counts_label(capped, true, 1000), "[1000/1000+]");
    }
}
