//! Event-bus protocol shared by all runtime components.
//!
//! This module defines the message payloads exchanged between the gallery
//! worker and the view layer, plus the artist/outcome types they carry.

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Gallery(GalleryMessage),
}

/// One gallery entry as loaded from `artists.json`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    /// Unique tag name of the artist on the search API.
    pub artist_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub tooltip: Option<String>,
}

impl Artist {
    /// Builds a bare artist with only a name, mostly for tests and ad-hoc lookups.
    pub fn named(artist_name: &str) -> Self {
        Self {
            artist_name: artist_name.to_string(),
            category: None,
            kind: None,
            tags: Vec::new(),
            thumbnail_url: None,
            tooltip: None,
        }
    }
}

/// Deduplicated post counts for one artist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountsResult {
    pub total_count: usize,
    /// Equals `total_count` when no filter tags are active.
    pub filtered_count: usize,
}

/// Terminal state of one image resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    /// Image URL to show; the durable cache holds the same value.
    Display { url: String },
    /// Nothing to show, with a human-readable reason.
    NoEntries { message: String },
}

impl ImageOutcome {
    pub fn no_entries(message: &str) -> Self {
        Self::NoEntries {
            message: message.to_string(),
        }
    }
}

/// Filters and page selection for one gallery view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GalleryQuery {
    /// Case-insensitive substring of the artist name; empty matches all.
    pub name_filter: String,
    /// Every tag must be present on the artist.
    pub active_tags: Vec<String>,
    /// Zero-based page index.
    pub page: usize,
}

/// Gallery-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum GalleryMessage {
    /// Filter and paginate the loaded artists, then resolve the visible page.
    ShowPage(GalleryQuery),
    /// One filtered page is ready; image and count notifications follow.
    PageRendered {
        title: String,
        artists: Vec<Artist>,
        page: usize,
        /// Matches left after this page.
        remaining: usize,
        /// Matches across all pages.
        total_matches: usize,
    },
    /// Resolve images for a page of artists, chunked by the batch scheduler.
    ResolveImages {
        artists: Vec<Artist>,
        force_reload: bool,
    },
    /// Compute counts for each artist against the active filter tags.
    RequestCounts {
        artists: Vec<Artist>,
        active_tags: Vec<String>,
    },
    ImageResolved {
        artist_name: String,
        outcome: ImageOutcome,
    },
    CountsUpdated {
        artist_name: String,
        counts: CountsResult,
    },
    /// Emitted once every artist of a `ResolveImages` request has an outcome.
    ImagesBatchFinished {
        resolved: usize,
    },
    /// Emitted once every artist of a `RequestCounts` request has counts.
    CountsBatchFinished {
        counted: usize,
    },
    /// Startup data could not be loaded; shown once as a global notice.
    DataLoadFailed(String),
    /// The gallery worker died; no further notifications will follow.
    WorkerStopped(String),
    Shutdown,
}
