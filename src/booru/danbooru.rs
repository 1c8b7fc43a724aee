//! Danbooru search endpoint and `ureq` transport.

use std::io::Read;
use std::time::Duration;

use crate::booru::{HttpReply, SearchTransport};
use crate::config::ApiConfig;

/// URL builder for the `posts.json` search endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanbooruEndpoint {
    base_url: String,
    result_limit: u32,
    order_term: String,
}

impl DanbooruEndpoint {
    pub fn new(base_url: &str, result_limit: u32, order_term: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            result_limit: result_limit.max(1),
            order_term: order_term.trim().to_string(),
        }
    }

    pub fn from_config(api: &ApiConfig) -> Self {
        Self::new(&api.base_url, api.result_limit, &api.order_term)
    }

    pub fn result_limit(&self) -> u32 {
        self.result_limit
    }

    /// Search URL for `tag_query` with the ordering term and result cap appended.
    pub fn search_url(&self, tag_query: &str) -> String {
        let mut tags = urlencoding::encode(tag_query).into_owned();
        if !self.order_term.is_empty() {
            // A literal `+` is a space inside the query string, so the ordering
            // term becomes one more search term.
            tags.push('+');
            tags.push_str(urlencoding::encode(&self.order_term).as_ref());
        }
        format!(
            "{}/posts.json?tags={}&limit={}",
            self.base_url, tags, self.result_limit
        )
    }

    /// Cheapest request that proves the API answers.
    pub fn health_url(&self) -> String {
        format!("{}/posts.json?limit=1", self.base_url)
    }
}

pub fn build_agent(api: &ApiConfig) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_millis(api.connect_timeout_ms))
        .timeout_read(Duration::from_millis(api.read_timeout_ms))
        .timeout_write(Duration::from_millis(api.read_timeout_ms))
        .user_agent(&api.user_agent)
        .build()
}

/// Search transport backed by `ureq`.
pub struct UreqTransport {
    http_client: ureq::Agent,
}

impl UreqTransport {
    pub fn new(api: &ApiConfig) -> Self {
        Self {
            http_client: build_agent(api),
        }
    }

    fn read_body(response: ureq::Response) -> Result<String, String> {
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|error| format!("Failed to read response: {error}"))?;
        Ok(body)
    }
}

impl SearchTransport for UreqTransport {
    fn get(&self, url: &str) -> Result<HttpReply, String> {
        match self
            .http_client
            .get(url)
            .set("Accept", "application/json")
            .call()
        {
            Ok(response) => {
                let status = response.status();
                let body = Self::read_body(response)?;
                Ok(HttpReply { status, body })
            }
            Err(ureq::Error::Status(status, response)) => Ok(HttpReply {
                status,
                body: Self::read_body(response).unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => Err(format!("Request failed: {transport}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DanbooruEndpoint;
    use crate::config::ApiConfig;

    #[test]
    fn test_search_url_appends_order_term_and_limit() {
        let endpoint = DanbooruEndpoint::from_config(&ApiConfig::default());
        assert_eq!(
            endpoint.search_url("foo_bar"),
            "https://danbooru.donmai.us/posts.json?tags=foo_bar+order%3Ascore&limit=1000"
        );
    }

    #[test]
    fn test_search_url_encodes_multi_tag_queries() {
        let endpoint = DanbooruEndpoint::new("https://booru.test/", 50, "order:score");
        assert_eq!(
            endpoint.search_url("foo_bar solo"),
            "https://booru.test/posts.json?tags=foo_bar%20solo+order%3Ascore&limit=50"
        );
    }

    #[test]
    fn test_search_url_without_order_term() {
        let endpoint = DanbooruEndpoint::new("https://booru.test", 10, " ");
        assert_eq!(
            endpoint.search_url("x"),
            "https://booru.test/posts.json?tags=x&limit=10"
        );
    }

    #[test]
    fn test_health_url_requests_single_post() {
        let endpoint = DanbooruEndpoint::new("https://booru.test", 10, "order:score");
        assert_eq!(endpoint.health_url(), "https://booru.test/posts.json?limit=1");
        assert_eq!(endpoint.result_limit(), 10);
    }
}
