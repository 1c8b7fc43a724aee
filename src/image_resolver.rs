//! Representative image resolution for an artist.
//!
//! Resolution order: durable cache (validated with an [`ImageProbe`]), then a
//! fresh search whose posts go through [`SelectionPolicy`]. Only a chosen URL
//! is ever written back; failures and empty results leave the durable cache
//! as it was.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};

use crate::booru::Post;
use crate::count_aggregator::QUERY_CACHE_PREFIX;
use crate::image_pipeline::ImageProbe;
use crate::kv_cache::{generate_cache_key, KeyValueCache};
use crate::protocol::{Artist, ImageOutcome};
use crate::query_client::QueryClient;

/// Durable cache prefix for resolved image URLs.
pub const IMAGE_CACHE_PREFIX: &str = "artist_img";
pub const NO_VALID_ENTRIES_MESSAGE: &str = "No valid entries";
pub const FAILED_TO_LOAD_MESSAGE: &str = "Failed to load image";

/// Still-image extensions that are safe to show in the gallery.
const SAFE_EXTENSIONS: [&str; 2] = ["jpg", "png"];
const EXPLICIT_RATING: &str = "e";

/// A named test a post must pass to be preferred.
pub struct SelectionRule {
    pub name: &'static str,
    pub accepts: fn(&Post) -> bool,
}

fn has_file_url(post: &Post) -> bool {
    post.file_url.as_deref().is_some_and(|url| !url.is_empty())
}

fn has_safe_extension(post: &Post) -> bool {
    post.file_ext
        .as_deref()
        .is_some_and(|ext| SAFE_EXTENSIONS.contains(&ext))
}

fn is_not_explicit(post: &Post) -> bool {
    post.rating.as_deref() != Some(EXPLICIT_RATING)
}

/// Picks the first post that passes every rule, falling back to the first post.
pub struct SelectionPolicy {
    rules: Vec<SelectionRule>,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            rules: vec![
                SelectionRule {
                    name: "has_file_url",
                    accepts: has_file_url,
                },
                SelectionRule {
                    name: "safe_still_image",
                    accepts: has_safe_extension,
                },
                SelectionRule {
                    name: "not_explicit",
                    accepts: is_not_explicit,
                },
            ],
        }
    }
}

impl SelectionPolicy {
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name).collect()
    }

    pub fn select<'a>(&self, posts: &'a [Post]) -> Option<&'a Post> {
        if let Some(preferred) = posts
            .iter()
            .find(|post| self.rules.iter().all(|rule| (rule.accepts)(post)))
        {
            return Some(preferred);
        }
        let fallback = posts.first();
        if let Some(post) = fallback {
            debug!(
                "No post passed [{}]; falling back to post {}",
                self.rule_names().join(", "),
                post.id
            );
        }
        fallback
    }
}

/// Resolves and caches the image shown for each artist.
pub struct ImageResolver {
    durable_cache: KeyValueCache,
    query_client: Arc<QueryClient>,
    probe: Arc<dyn ImageProbe>,
    policy: SelectionPolicy,
    artist_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ImageResolver {
    pub fn new(
        durable_cache: KeyValueCache,
        query_client: Arc<QueryClient>,
        probe: Arc<dyn ImageProbe>,
    ) -> Self {
        Self {
            durable_cache,
            query_client,
            probe,
            policy: SelectionPolicy::default(),
            artist_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns what to display for `artist`.
    ///
    /// Resolutions for the same artist are serialized, so a forced reload
    /// queued behind an ambient one still performs its own fetch and writes last.
    pub fn resolve_image(&self, artist: &Artist, force_reload: bool) -> ImageOutcome {
        let artist_lock = self.artist_lock(&artist.artist_name);
        let _guard = artist_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let image_key = generate_cache_key(IMAGE_CACHE_PREFIX, &artist.artist_name);
        let mut bypass_session = force_reload;
        if !force_reload {
            if let Some(cached_url) = self.durable_cache.get::<String>(&image_key) {
                if self.probe.probe(&cached_url) {
                    debug!("Using cached image for {}", artist.artist_name);
                    return ImageOutcome::Display { url: cached_url };
                }
                info!(
                    "Cached image for {} no longer loads; refetching",
                    artist.artist_name
                );
                self.durable_cache.remove(&image_key);
                // The session list may be the one that produced the dead URL.
                bypass_session = true;
            }
        }

        self.fetch_and_select(&artist.artist_name, &image_key, bypass_session)
    }

    fn fetch_and_select(
        &self,
        artist_name: &str,
        image_key: &str,
        bypass_session: bool,
    ) -> ImageOutcome {
        let query_key = generate_cache_key(QUERY_CACHE_PREFIX, artist_name);
        let search_result = if bypass_session {
            self.query_client.search_fresh(artist_name, &query_key)
        } else {
            self.query_client.search(artist_name, &query_key)
        };
        let posts = match search_result {
            Ok(posts) => posts,
            Err(error) => {
                warn!("Error fetching image for {}: {}", artist_name, error);
                return ImageOutcome::no_entries(FAILED_TO_LOAD_MESSAGE);
            }
        };

        let Some(url) = self
            .policy
            .select(&posts)
            .and_then(|post| post.file_url.clone())
            .filter(|url| !url.is_empty())
        else {
            debug!("No usable post for {} ({} posts)", artist_name, posts.len());
            return ImageOutcome::no_entries(NO_VALID_ENTRIES_MESSAGE);
        };

        self.durable_cache.set(image_key, &url);
        ImageOutcome::Display { url }
    }

    fn artist_lock(&self, artist_name: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .artist_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(artist_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{
        ImageResolver, SelectionPolicy, FAILED_TO_LOAD_MESSAGE, NO_VALID_ENTRIES_MESSAGE,
    };
    use crate::availability::AvailabilityGate;
    use crate::booru::danbooru::DanbooruEndpoint;
    use crate::booru::test_support::{post, posts_body, FakeTransport};
    use crate::booru::Post;
    use crate::image_pipeline::test_support::FakeProbe;
    use crate::kv_cache::test_support::CountingStore;
    use crate::kv_cache::{CacheScope, KeyValueCache};
    use crate::protocol::{Artist, ImageOutcome};
    use crate::query_client::QueryClient;

    struct Harness {
        resolver: ImageResolver,
        transport: Arc<FakeTransport>,
        durable: Arc<CountingStore>,
        probe: Arc<FakeProbe>,
        gate: AvailabilityGate,
    }

    fn harness(transport: FakeTransport, probe: FakeProbe) -> Harness {
        let gate = AvailabilityGate::new();
        let transport = Arc::new(transport);
        let durable = Arc::new(CountingStore::new());
        let probe = Arc::new(probe);
        let client = QueryClient::new(
            gate.clone(),
            KeyValueCache::session(0),
            transport.clone(),
            DanbooruEndpoint::new("https://booru.test", 1000, "order:score"),
        );
        let resolver = ImageResolver::new(
            KeyValueCache::new(CacheScope::Durable, durable.clone()),
            Arc::new(client),
            probe.clone(),
        );
        Harness {
            resolver,
            transport,
            durable,
            probe,
            gate,
        }
    }

    fn mixed_posts() -> Vec<Post> {
        vec![
            post(1, Some("https://cdn.test/a.png"), "png", "s"),
            post(2, Some("https://cdn.test/b.jpg"), "jpg", "e"),
        ]
    }

    fn display(url: &str) -> ImageOutcome {
        ImageOutcome::Display {
            url: url.to_string(),
        }
    }

    #[test]
    fn test_policy_prefers_first_safe_post() {
        let posts = vec![
            post(1, Some("https://cdn.test/1.mp4"), "mp4", "s"),
            post(2, Some("https://cdn.test/2.png"), "png", "e"),
            post(3, None, "jpg", "g"),
            post(4, Some("https://cdn.test/4.jpg"), "jpg", "q"),
        ];
        let selected = SelectionPolicy::default().select(&posts).map(|post| post.id);
        assert_eq!(selected, Some(4));
    }

    #[test]
    fn test_policy_falls_back_to_first_post() {
        let posts = vec![
            post(7, Some("https://cdn.test/7.webm"), "webm", "e"),
            post(8, Some("https://cdn.test/8.gif"), "gif", "s"),
        ];
        let selected = SelectionPolicy::default().select(&posts).map(|post| post.id);
        assert_eq!(selected, Some(7));
        assert_eq!(SelectionPolicy::default().select(&[]), None);
    }

    #[test]
    fn test_policy_rules_are_named_in_order() {
        assert_eq!(
            SelectionPolicy::default().rule_names(),
            vec!["has_file_url", "safe_still_image", "not_explicit"]
        );
    }

    #[test]
    fn test_cold_resolution_selects_and_caches_safe_post() {
        let h = harness(
            FakeTransport::always(&posts_body(&mixed_posts())),
            FakeProbe::default(),
        );

        let outcome = h.resolver.resolve_image(&Artist::named("foo_bar"), false);

        assert_eq!(outcome, display("https://cdn.test/a.png"));
        assert_eq!(
            h.durable.peek("artist_img_foo_bar").as_deref(),
            Some("\"https://cdn.test/a.png\"")
        );
        assert_eq!(h.transport.calls(), 1);
        assert_eq!(h.probe.calls(), 0);
    }

    #[test]
    fn test_empty_result_reports_default_message_and_leaves_cache_alone() {
        let h = harness(FakeTransport::always("[]"), FakeProbe::default());

        let outcome = h.resolver.resolve_image(&Artist::named("nobody"), false);

        assert_eq!(outcome, ImageOutcome::no_entries(NO_VALID_ENTRIES_MESSAGE));
        assert_eq!(h.durable.writes(), 0);
        assert_eq!(h.durable.removes(), 0);
    }

    #[test]
    fn test_selected_post_without_url_reports_no_entries() {
        let posts = vec![post(5, None, "png", "s")];
        let h = harness(FakeTransport::always(&posts_body(&posts)), FakeProbe::default());

        let outcome = h.resolver.resolve_image(&Artist::named("ghost"), false);

        assert_eq!(outcome, ImageOutcome::no_entries(NO_VALID_ENTRIES_MESSAGE));
        assert_eq!(h.durable.writes(), 0);
    }

    #[test]
    fn test_query_failure_reports_failed_to_load() {
        let transport = FakeTransport::new();
        transport.route("tags=foo_bar", 500, "oops");
        let h = harness(transport, FakeProbe::default());

        let outcome = h.resolver.resolve_image(&Artist::named("foo_bar"), false);

        assert_eq!(outcome, ImageOutcome::no_entries(FAILED_TO_LOAD_MESSAGE));
        assert_eq!(h.durable.writes(), 0);
    }

    #[test]
    fn test_unavailable_gate_reports_failed_to_load_without_network() {
        let h = harness(
            FakeTransport::always(&posts_body(&mixed_posts())),
            FakeProbe::default(),
        );
        h.gate.set_unavailable(true);

        let outcome = h.resolver.resolve_image(&Artist::named("foo_bar"), false);

        assert_eq!(outcome, ImageOutcome::no_entries(FAILED_TO_LOAD_MESSAGE));
        assert_eq!(h.transport.calls(), 0);
    }

    #[test]
    fn test_live_cached_url_is_used_without_fetching() {
        let h = harness(
            FakeTransport::always(&posts_body(&mixed_posts())),
            FakeProbe::with_live(&["https://cdn.test/cached.png"]),
        );
        h.durable
            .seed("artist_img_foo_bar", "\"https://cdn.test/cached.png\"");

        let outcome = h.resolver.resolve_image(&Artist::named("foo_bar"), false);

        assert_eq!(outcome, display("https://cdn.test/cached.png"));
        assert_eq!(h.transport.calls(), 0);
        assert_eq!(h.durable.writes(), 0);
        assert_eq!(h.durable.removes(), 0);
    }

    #[test]
    fn test_dead_cached_url_is_evicted_then_fetched_once() {
        let h = harness(
            FakeTransport::always(&posts_body(&mixed_posts())),
            FakeProbe::default(),
        );
        h.durable.seed("artist_img_foo_bar", "\"https://cdn.test/gone.png\"");

        let outcome = h.resolver.resolve_image(&Artist::named("foo_bar"), false);

        assert_eq!(outcome, display("https://cdn.test/a.png"));
        assert_eq!(h.probe.calls(), 1);
        assert_eq!(h.durable.removes(), 1);
        assert_eq!(h.transport.calls(), 1);
        assert_eq!(
            h.durable.peek("artist_img_foo_bar").as_deref(),
            Some("\"https://cdn.test/a.png\"")
        );
    }

    #[test]
    fn test_force_reload_skips_durable_read_and_overwrites() {
        let h = harness(
            FakeTransport::always(&posts_body(&mixed_posts())),
            FakeProbe::with_live(&["https://cdn.test/old.png"]),
        );
        h.durable.seed("artist_img_foo_bar", "\"https://cdn.test/old.png\"");

        let outcome = h.resolver.resolve_image(&Artist::named("foo_bar"), true);

        assert_eq!(outcome, display("https://cdn.test/a.png"));
        assert_eq!(h.durable.reads(), 0);
        assert_eq!(h.probe.calls(), 0);
        assert_eq!(h.transport.calls(), 1);
        assert_eq!(
            h.durable.peek("artist_img_foo_bar").as_deref(),
            Some("\"https://cdn.test/a.png\"")
        );
    }

    #[test]
    fn test_force_reload_fetches_even_with_session_cached_list() {
        let h = harness(
            FakeTransport::always(&posts_body(&mixed_posts())),
            FakeProbe::default(),
        );
        let artist = Artist::named("foo_bar");
        assert_eq!(
            h.resolver.resolve_image(&artist, false),
            display("https://cdn.test/a.png")
        );
        assert_eq!(h.transport.calls(), 1);

        let outcome = h.resolver.resolve_image(&artist, true);

        assert_eq!(outcome, display("https://cdn.test/a.png"));
        assert_eq!(h.transport.calls(), 2);
    }

    #[test]
    fn test_eviction_refetch_skips_session_cached_list() {
        let h = harness(
            FakeTransport::always(&posts_body(&mixed_posts())),
            FakeProbe::with_live(&["https://cdn.test/a.png"]),
        );
        let artist = Artist::named("foo_bar");
        h.resolver.resolve_image(&artist, false);
        h.durable.seed("artist_img_foo_bar", "\"https://cdn.test/gone.png\"");

        let outcome = h.resolver.resolve_image(&artist, false);

        assert_eq!(outcome, display("https://cdn.test/a.png"));
        assert_eq!(h.transport.calls(), 2);
    }

    #[test]
    fn test_forced_reload_failure_keeps_previous_entry() {
        let transport = FakeTransport::new();
        transport.set_fallback(Err("timed out".to_string()));
        let h = harness(transport, FakeProbe::default());
        h.durable.seed("artist_img_foo_bar", "\"https://cdn.test/old.png\"");

        let outcome = h.resolver.resolve_image(&Artist::named("foo_bar"), true);

        assert_eq!(outcome, ImageOutcome::no_entries(FAILED_TO_LOAD_MESSAGE));
        assert_eq!(
            h.durable.peek("artist_img_foo_bar").as_deref(),
            Some("\"https://cdn.test/old.png\"")
        );
    }

    #[test]
    fn test_concurrent_resolutions_for_same_artist_share_one_search() {
        let h = harness(
            FakeTransport::always(&posts_body(&mixed_posts())),
            FakeProbe::with_live(&["https://cdn.test/a.png"]),
        );
        let artist = Artist::named("foo_bar");

        let outcomes: Vec<ImageOutcome> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| h.resolver.resolve_image(&artist, false)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("resolver thread"))
                .collect()
        });

        assert!(outcomes
            .iter()
            .all(|outcome| *outcome == display("https://cdn.test/a.png")));
        assert_eq!(h.transport.calls(), 1);
        assert_eq!(h.durable.writes(), 1);
    }
}
