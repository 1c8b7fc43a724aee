//! Persistent application configuration model and defaults.

use std::path::PathBuf;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Search API endpoint and request pacing.
    pub api: ApiConfig,
    #[serde(default)]
    /// Bulk resolution chunking.
    pub batch: BatchConfig,
    #[serde(default)]
    /// Session and durable cache storage.
    pub cache: CacheConfig,
    #[serde(default)]
    /// Gallery paging and static data location.
    pub gallery: GalleryConfig,
    #[serde(default)]
    /// Log output preferences.
    pub logging: LoggingConfig,
}

/// Search API endpoint and request behavior.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    /// Maximum number of posts requested per query.
    #[serde(default = "default_result_limit")]
    pub result_limit: u32,
    /// Secondary ordering term appended to every image query.
    #[serde(default = "default_order_term")]
    pub order_term: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_max_requests_per_second")]
    pub max_requests_per_second: u32,
    /// Upper bound on how long a request waits for a rate-limit slot.
    #[serde(default = "default_rate_limit_wait_ms")]
    pub rate_limit_wait_ms: u64,
    #[serde(default = "default_true")]
    pub startup_health_check: bool,
}

/// Bulk image resolution chunking.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub delay_ms: u64,
}

/// Cache storage locations and limits.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CacheConfig {
    /// Overrides the durable cache database location.
    #[serde(default)]
    pub durable_path: Option<PathBuf>,
    /// Byte budget of the in-memory session cache. Zero disables the limit.
    #[serde(default = "default_session_quota_bytes")]
    pub session_quota_bytes: usize,
}

/// Gallery paging and static data preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct GalleryConfig {
    #[serde(default = "default_items_per_page")]
    pub items_per_page: usize,
    /// Directory holding `artists.json` and the tag/flavor documents.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Log level selection.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
}

/// Persisted log verbosity.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            result_limit: default_result_limit(),
            order_term: default_order_term(),
            user_agent: default_user_agent(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            max_requests_per_second: default_max_requests_per_second(),
            rate_limit_wait_ms: default_rate_limit_wait_ms(),
            startup_health_check: true,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            delay_ms: default_batch_delay_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            durable_path: None,
            session_quota_bytes: default_session_quota_bytes(),
        }
    }
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            items_per_page: default_items_per_page(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_base_url() -> String {
    "https://danbooru.donmai.us".to_string()
}

fn default_result_limit() -> u32 {
    1000
}

fn default_order_term() -> String {
    "order:score".to_string()
}

fn default_user_agent() -> String {
    "kexplorer/0.1.0".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_read_timeout_ms() -> u64 {
    15_000
}

fn default_max_requests_per_second() -> u32 {
    10
}

fn default_rate_limit_wait_ms() -> u64 {
    2_000
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_delay_ms() -> u64 {
    600
}

fn default_session_quota_bytes() -> usize {
    // A full page of unrestricted and tag-restricted result lists at the
    // default result limit, with headroom.
    32 * 1024 * 1024
}

fn default_items_per_page() -> usize {
    25
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Clamps values that would stall the runtime if left at zero.
pub fn sanitize_config(config: Config) -> Config {
    let mut sanitized = config;
    sanitized.api.result_limit = sanitized.api.result_limit.max(1);
    sanitized.api.max_requests_per_second = sanitized.api.max_requests_per_second.max(1);
    sanitized.api.base_url = sanitized.api.base_url.trim().trim_end_matches('/').to_string();
    sanitized.batch.size = sanitized.batch.size.max(1);
    sanitized.gallery.items_per_page = sanitized.gallery.items_per_page.max(1);
    sanitized
}
