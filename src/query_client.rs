//! Session-cached, gate-aware search client.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;
use serde_json::Value;

use crate::availability::AvailabilityGate;
use crate::booru::danbooru::DanbooruEndpoint;
use crate::booru::{Post, SearchTransport};
use crate::kv_cache::KeyValueCache;

const RATE_LIMIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Why a search produced no result list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The gate is tripped; nothing was attempted.
    #[error("search API is unavailable")]
    ServiceUnavailable,
    #[error("search API returned HTTP status {status}")]
    Transport { status: u16 },
    /// No status was received at all.
    #[error("search request failed: {0}")]
    Network(String),
    /// Successful status with a body that is not a post list.
    #[error("search API returned a malformed response: {0}")]
    MalformedResponse(String),
}

/// Issues tag searches, consulting the session cache first.
pub struct QueryClient {
    gate: AvailabilityGate,
    session_cache: KeyValueCache,
    transport: Arc<dyn SearchTransport>,
    endpoint: DanbooruEndpoint,
    limiter: Option<DirectLimiter>,
    rate_limit_wait: Duration,
}

impl QueryClient {
    pub fn new(
        gate: AvailabilityGate,
        session_cache: KeyValueCache,
        transport: Arc<dyn SearchTransport>,
        endpoint: DanbooruEndpoint,
    ) -> Self {
        Self {
            gate,
            session_cache,
            transport,
            endpoint,
            limiter: None,
            rate_limit_wait: Duration::ZERO,
        }
    }

    /// Paces network requests to `per_second`, waiting at most `max_wait` for a slot.
    pub fn with_rate_limit(mut self, per_second: u32, max_wait: Duration) -> Self {
        self.limiter = NonZeroU32::new(per_second)
            .map(|per_second| RateLimiter::direct(Quota::per_second(per_second)));
        self.rate_limit_wait = max_wait;
        self
    }

    pub fn endpoint(&self) -> &DanbooruEndpoint {
        &self.endpoint
    }

    /// Returns the posts for `tag_query`, using `cache_key` in the session cache.
    ///
    /// Cached lists are returned without any freshness check. Only well-formed
    /// lists are ever written back, including empty ones.
    pub fn search(&self, tag_query: &str, cache_key: &str) -> Result<Vec<Post>, QueryError> {
        self.run_search(tag_query, cache_key, true)
    }

    /// Like [`search`](Self::search) but never answers from the session
    /// cache. A successful result still replaces the cached list.
    pub fn search_fresh(&self, tag_query: &str, cache_key: &str) -> Result<Vec<Post>, QueryError> {
        self.run_search(tag_query, cache_key, false)
    }

    fn run_search(
        &self,
        tag_query: &str,
        cache_key: &str,
        read_cache: bool,
    ) -> Result<Vec<Post>, QueryError> {
        if self.gate.is_unavailable() {
            debug!("Search for '{}' skipped: API unavailable", tag_query);
            return Err(QueryError::ServiceUnavailable);
        }

        if read_cache {
            if let Some(posts) = self.session_cache.get::<Vec<Post>>(cache_key) {
                debug!(
                    "Session cache hit for '{}' ({} posts)",
                    cache_key,
                    posts.len()
                );
                return Ok(posts);
            }
        }

        self.wait_for_rate_limit_slot();
        let url = self.endpoint.search_url(tag_query);
        debug!("Searching '{}'", tag_query);
        let reply = self.transport.get(&url).map_err(QueryError::Network)?;
        if !reply.is_success() {
            return Err(QueryError::Transport {
                status: reply.status,
            });
        }

        let posts = Self::parse_posts(&reply.body)?;
        self.session_cache.set(cache_key, &posts);
        Ok(posts)
    }

    fn parse_posts(body: &str) -> Result<Vec<Post>, QueryError> {
        let parsed: Value = serde_json::from_str(body)
            .map_err(|error| QueryError::MalformedResponse(format!("invalid JSON: {error}")))?;
        if !parsed.is_array() {
            let kind = match parsed {
                Value::Object(_) => "object",
                Value::String(_) => "string",
                Value::Number(_) => "number",
                Value::Bool(_) => "boolean",
                Value::Null => "null",
                Value::Array(_) => "array",
            };
            return Err(QueryError::MalformedResponse(format!(
                "expected a list of posts, got {kind}"
            )));
        }
        serde_json::from_value(parsed)
            .map_err(|error| QueryError::MalformedResponse(format!("invalid post entry: {error}")))
    }

    fn wait_for_rate_limit_slot(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        if limiter.check().is_ok() {
            return;
        }

        let deadline = Instant::now() + self.rate_limit_wait;
        while Instant::now() < deadline {
            std::thread::sleep(RATE_LIMIT_POLL_INTERVAL);
            if limiter.check().is_ok() {
                return;
            }
        }
        debug!("Rate limit wait cap reached; sending request anyway");
    }
}
