//! Search API payloads and transport abstraction.

pub mod danbooru;

/// One search result. Only the fields the gallery reads are decoded, which also
/// keeps session-cached lists small.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Post {
    pub id: u64,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_ext: Option<String>,
    /// Content classification code (`g`, `s`, `q`, `e`).
    #[serde(default)]
    pub rating: Option<String>,
}

/// Raw HTTP reply, regardless of status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking GET transport used for search requests and health checks.
///
/// Non-2xx replies are returned as `Ok` with their status; `Err` is reserved
/// for failures where no status was received.
pub trait SearchTransport: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpReply, String>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::{HttpReply, Post, SearchTransport};

    pub(crate) fn post(id: u64, file_url: Option<&str>, file_ext: &str, rating: &str) -> Post {
        Post {
            id,
            file_url: file_url.map(ToOwned::to_owned),
            file_ext: Some(file_ext.to_string()),
            rating: Some(rating.to_string()),
        }
    }

    pub(crate) fn posts_body(posts: &[Post]) -> String {
        serde_json::to_string(posts).expect("posts should serialize")
    }

    /// Scripted transport keyed by a substring of the requested URL.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        routes: Mutex<Vec<(String, Result<HttpReply, String>)>>,
        fallback: Mutex<Option<Result<HttpReply, String>>>,
        calls: AtomicUsize,
        requested: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Replies with `body` and status 200 for every URL.
        pub(crate) fn always(body: &str) -> Self {
            let transport = Self::new();
            transport.set_fallback(Ok(HttpReply {
                status: 200,
                body: body.to_string(),
            }));
            transport
        }

        pub(crate) fn set_fallback(&self, reply: Result<HttpReply, String>) {
            *self.fallback.lock().expect("fallback lock") = Some(reply);
        }

        /// Routes URLs containing `needle` to `reply`. Earlier routes win.
        pub(crate) fn route(&self, needle: &str, status: u16, body: &str) {
            self.routes.lock().expect("routes lock").push((
                needle.to_string(),
                Ok(HttpReply {
                    status,
                    body: body.to_string(),
                }),
            ));
        }

        pub(crate) fn route_error(&self, needle: &str, error: &str) {
            self.routes
                .lock()
                .expect("routes lock")
                .push((needle.to_string(), Err(error.to_string())));
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn requested_urls(&self) -> Vec<String> {
            self.requested.lock().expect("requested lock").clone()
        }
    }

    impl SearchTransport for FakeTransport {
        fn get(&self, url: &str) -> Result<HttpReply, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested
                .lock()
                .expect("requested lock")
                .push(url.to_string());
            let routes = self.routes.lock().expect("routes lock");
            for (needle, reply) in routes.iter() {
                if url.contains(needle.as_str()) {
                    return reply.clone();
                }
            }
            drop(routes);
            self.fallback
                .lock()
                .expect("fallback lock")
                .clone()
                .unwrap_or_else(|| Err(format!("no scripted reply for {url}")))
        }
    }
}
