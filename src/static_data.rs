//! Startup documents: artists, tag tooltips and flavor lines.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use log::{error, info};
use serde::de::DeserializeOwned;

use crate::protocol::Artist;

pub const ARTISTS_FILE: &str = "artists.json";
pub const TAG_TOOLTIPS_FILE: &str = "tag-tooltips.json";
pub const TAUNTS_FILE: &str = "taunts.json";
pub const TAG_TAUNTS_FILE: &str = "tag-taunts.json";

#[derive(Debug, thiserror::Error)]
pub enum StaticDataError {
    #[error("failed to read {file}: {source}")]
    Read {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {file}: {source}")]
    Parse {
        file: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("loader thread for {file} panicked")]
    LoaderPanicked { file: PathBuf },
}

/// Flavor lines for one tag; the file allows a single line or a list.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(untagged)]
pub enum TagTaunts {
    One(String),
    Many(Vec<String>),
}

impl TagTaunts {
    pub fn lines(&self) -> &[String] {
        match self {
            Self::One(line) => std::slice::from_ref(line),
            Self::Many(lines) => lines,
        }
    }
}

/// Everything the gallery needs before the first page is shown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticData {
    pub artists: Vec<Artist>,
    pub tag_tooltips: HashMap<String, String>,
    pub taunts: Vec<String>,
    pub tag_taunts: HashMap<String, TagTaunts>,
}

impl StaticData {
    /// Sorted union of tooltip keys and every artist tag.
    pub fn tag_catalog(&self) -> Vec<String> {
        let mut catalog: BTreeSet<&str> = self.tag_tooltips.keys().map(String::as_str).collect();
        catalog.extend(
            self.artists
                .iter()
                .flat_map(|artist| artist.tags.iter().map(String::as_str)),
        );
        catalog.into_iter().map(ToOwned::to_owned).collect()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StaticDataError> {
    let text = fs::read_to_string(path).map_err(|source| StaticDataError::Read {
        file: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| StaticDataError::Parse {
        file: path.to_path_buf(),
        source,
    })
}

fn join_loader<T>(
    handle: thread::ScopedJoinHandle<'_, Result<T, StaticDataError>>,
    path: &Path,
) -> Result<T, StaticDataError> {
    handle
        .join()
        .unwrap_or_else(|_| {
            Err(StaticDataError::LoaderPanicked {
                file: path.to_path_buf(),
            })
        })
}

/// Loads the four documents from `data_dir` in parallel. Any failure fails
/// the whole load.
pub fn load_static_data(data_dir: &Path) -> Result<StaticData, StaticDataError> {
    let artists_path = data_dir.join(ARTISTS_FILE);
    let tooltips_path = data_dir.join(TAG_TOOLTIPS_FILE);
    let taunts_path = data_dir.join(TAUNTS_FILE);
    let tag_taunts_path = data_dir.join(TAG_TAUNTS_FILE);

    let result: Result<StaticData, StaticDataError> = thread::scope(|scope| {
        let artists = scope.spawn(|| read_json::<Vec<Artist>>(&artists_path));
        let tooltips = scope.spawn(|| read_json::<HashMap<String, String>>(&tooltips_path));
        let taunts = scope.spawn(|| read_json::<Vec<String>>(&taunts_path));
        let tag_taunts = scope.spawn(|| read_json::<HashMap<String, TagTaunts>>(&tag_taunts_path));

        let artists = join_loader(artists, &artists_path);
        let tag_tooltips = join_loader(tooltips, &tooltips_path);
        let taunts = join_loader(taunts, &taunts_path);
        let tag_taunts = join_loader(tag_taunts, &tag_taunts_path);

        Ok(StaticData {
            artists: artists?,
            tag_tooltips: tag_tooltips?,
            taunts: taunts?,
            tag_taunts: tag_taunts?,
        })
    });

    match &result {
        Ok(data) => info!(
            "Loaded {} artists and {} tag tooltips from {}",
            data.artists.len(),
            data.tag_tooltips.len(),
            data_dir.display()
        ),
        Err(err) => error!("Failed to load required data files: {}", err),
    }
    result
}
