//! Gallery view-model: filtering, paging, tags, copied artists and flavor text.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::protocol::{Artist, GalleryQuery};
use crate::static_data::StaticData;

pub const BASE_PAGE_TITLE: &str = "Artist Explorer";
const UNKNOWN_LABEL: &str = "Unknown";

/// One page of filtered artists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryPage<'a> {
    pub artists: Vec<&'a Artist>,
    pub page: usize,
    pub remaining: usize,
    pub total_matches: usize,
}

/// Artist tag names use underscores for spaces.
pub fn display_name(artist_name: &str) -> String {
    artist_name.replace('_', " ")
}

/// `"{name} ({category}, {type})"` with `Unknown` for missing parts.
pub fn artist_label(artist: &Artist) -> String {
    format!(
        "{} ({}, {})",
        display_name(&artist.artist_name),
        artist.category.as_deref().unwrap_or(UNKNOWN_LABEL),
        artist.kind.as_deref().unwrap_or(UNKNOWN_LABEL)
    )
}

pub fn artist_matches(artist: &Artist, name_filter: &str, active_tags: &[String]) -> bool {
    let name_filter = name_filter.trim().to_lowercase();
    let matches_name =
        name_filter.is_empty() || artist.artist_name.to_lowercase().contains(&name_filter);
    let matches_tags = active_tags.iter().all(|tag| artist.tags.contains(tag));
    matches_name && matches_tags
}

pub fn filter_artists<'a>(
    artists: &'a [Artist],
    name_filter: &str,
    active_tags: &[String],
) -> Vec<&'a Artist> {
    artists
        .iter()
        .filter(|artist| artist_matches(artist, name_filter, active_tags))
        .collect()
}

/// Filters `artists` by `query` and cuts out page `query.page`.
pub fn paginate<'a>(
    artists: &'a [Artist],
    query: &GalleryQuery,
    items_per_page: usize,
) -> GalleryPage<'a> {
    let items_per_page = items_per_page.max(1);
    let matches = filter_artists(artists, &query.name_filter, &query.active_tags);
    let total_matches = matches.len();
    let start = query.page.saturating_mul(items_per_page).min(total_matches);
    let end = start.saturating_add(items_per_page).min(total_matches);
    GalleryPage {
        artists: matches[start..end].to_vec(),
        page: query.page,
        remaining: total_matches - end,
        total_matches,
    }
}

/// Case-insensitive substring search over the tag catalog.
pub fn search_tags<'a>(catalog: &'a [String], search: &str) -> Vec<&'a str> {
    let needle = search.trim().to_lowercase();
    catalog
        .iter()
        .filter(|tag| needle.is_empty() || tag.to_lowercase().contains(&needle))
        .map(String::as_str)
        .collect()
}

/// Active filter tags in activation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveTags {
    tags: Vec<String>,
}

impl ActiveTags {
    /// Activates each tag in turn. A tag given an even number of times ends up inactive.
    pub fn from_tags<S: AsRef<str>>(tags: impl IntoIterator<Item = S>) -> Self {
        let mut active = Self::default();
        for tag in tags {
            active.toggle(tag.as_ref());
        }
        active
    }

    /// Adds `tag` if absent, removes it otherwise. Returns whether it is now active.
    pub fn toggle(&mut self, tag: &str) -> bool {
        if let Some(index) = self.tags.iter().position(|active| active == tag) {
            self.tags.remove(index);
            false
        } else {
            self.tags.push(tag.to_string());
            true
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tags
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Window title reflecting the active filters.
pub fn page_title(active_tags: &[String], artist_filter: &str) -> String {
    let artist_filter = artist_filter.trim();
    let mut parts = Vec::new();
    if !active_tags.is_empty() {
        parts.push(format!("Tags: {}", active_tags.join(", ")));
    }
    if !artist_filter.is_empty() {
        parts.push(format!("Artist: {artist_filter}"));
    }
    if parts.is_empty() {
        BASE_PAGE_TITLE.to_string()
    } else {
        format!("{BASE_PAGE_TITLE} - {}", parts.join(" | "))
    }
}

/// Search text that pastes an artist into a booru search box.
pub fn artist_copy_text(artist_name: &str) -> String {
    format!("artist:{}", display_name(artist_name))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedArtistEntry {
    pub artist_name: String,
    pub label: String,
    pub tooltip: String,
    pub thumbnail_url: Option<String>,
}

/// Artists copied during this run, oldest first, without duplicates.
#[derive(Debug, Clone, Default)]
pub struct CopiedArtists {
    names: Vec<String>,
}

impl CopiedArtists {
    /// Records a copy and returns the copy text. Re-copying keeps the original position.
    pub fn copy(&mut self, artist_name: &str) -> String {
        if !self.names.iter().any(|name| name == artist_name) {
            self.names.push(artist_name.to_string());
        }
        artist_copy_text(artist_name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Sidebar rows, enriched from `artists` where the name is known.
    pub fn entries(&self, artists: &[Artist]) -> Vec<CopiedArtistEntry> {
        self.names
            .iter()
            .map(|name| {
                let artist = artists.iter().find(|artist| &artist.artist_name == name);
                let label = display_name(name);
                CopiedArtistEntry {
                    artist_name: name.clone(),
                    tooltip: artist
                        .and_then(|artist| artist.tooltip.clone())
                        .unwrap_or_else(|| label.clone()),
                    thumbnail_url: artist.and_then(|artist| artist.thumbnail_url.clone()),
                    label,
                }
            })
            .collect()
    }
}

/// Flavor line for a newly activated tag, falling back to the general pool.
pub fn pick_taunt<'a, R: Rng + ?Sized>(
    data: &'a StaticData,
    activated_tag: Option<&str>,
    rng: &mut R,
) -> Option<&'a str> {
    let tag_lines = activated_tag
        .and_then(|tag| data.tag_taunts.get(tag))
        .map(|taunts| taunts.lines())
        .filter(|lines| !lines.is_empty());
    tag_lines
        .unwrap_or(data.taunts.as_slice())
        .choose(rng)
        .map(String::as_str)
}

/// Thumbnail of a random artist that has one.
pub fn random_background<'a, R: Rng + ?Sized>(
    artists: &'a [Artist],
    rng: &mut R,
) -> Option<&'a str> {
    let with_thumbnails: Vec<&str> = artists
        .iter()
        .filter_map(|artist| artist.thumbnail_url.as_deref())
        .collect();
    with_thumbnails.choose(rng).copied()
}
