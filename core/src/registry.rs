use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::numbering::episode_number;
use crate::utils::{format_bytes, get_file_extension, is_video_file};
use crate::{OrganizerError, Result};

/// Where an item's media comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemSource {
    Local(PathBuf),
    Remote(String),
}

impl ItemSource {
    pub fn is_remote(&self) -> bool {
        matches!(self, ItemSource::Remote(_))
    }

    /// Argument handed to the transcoder's input flag
    pub fn input_spec(&self) -> String {
        match self {
            ItemSource::Local(path) => path.to_string_lossy().into_owned(),
            ItemSource::Remote(url) => url.clone(),
        }
    }

    /// Source extension including the dot, if the source has one
    pub fn extension(&self) -> Option<String> {
        match self {
            ItemSource::Local(path) => get_file_extension(path).map(|ext| format!(".{ext}")),
            ItemSource::Remote(_) => None,
        }
    }
}

impl fmt::Display for ItemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemSource::Local(path) => write!(f, "{}", path.display()),
            ItemSource::Remote(url) => f.write_str(url),
        }
    }
}

/// One discovered audio stream of a local container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    /// Position among the container's audio streams
    pub index: usize,
    pub codec: String,
    pub language: String,
    pub title: String,
    pub channels: u32,
    pub sample_rate: u32,
}

/// One unit of input: a local video file or a remote stream episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub source: ItemSource,
    pub display_name: String,
    pub size_hint: Option<String>,
    pub audio_tracks: Vec<AudioTrack>,
}

impl WorkItem {
    /// Item for a file on disk, named after the file
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let size_hint = std::fs::metadata(&path)
            .ok()
            .map(|metadata| format_bytes(metadata.len()));

        Self {
            source: ItemSource::Local(path),
            display_name,
            size_hint,
            audio_tracks: Vec::new(),
        }
    }

    /// Build a remote episode, rejecting anything that is not an absolute
    /// http, https or ftp URL.
    pub fn remote(url: &str, name: impl Into<String>) -> Result<Self> {
        let url = url.trim();
        let parsed = Url::parse(url).map_err(|e| OrganizerError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https" | "ftp") {
            return Err(OrganizerError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        Ok(Self {
            source: ItemSource::Remote(url.to_string()),
            display_name: name.into(),
            size_hint: None,
            audio_tracks: Vec::new(),
        })
    }

    pub fn local_path(&self) -> Option<&Path> {
        match &self.source {
            ItemSource::Local(path) => Some(path),
            ItemSource::Remote(_) => None,
        }
    }
}

/// Entry of a saved remote episode list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeEntry {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Enumerate the video files of `source_folder`, sorted by lowercased name.
///
/// A folder without matches yields an empty list; a missing folder is
/// `NotFound`.
pub fn detect_video_files(source_folder: &Path) -> Result<Vec<WorkItem>> {
    if !source_folder.is_dir() {
        return Err(OrganizerError::NotFound(source_folder.to_path_buf()));
    }

    let entries =
        std::fs::read_dir(source_folder).map_err(|e| OrganizerError::io(source_folder, e))?;

    let mut items = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry in '{}': {e}", source_folder.display());
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            debug!("skipping non-file: '{}'", path.display());
            continue;
        }
        if !is_video_file(&path) {
            debug!("skipping non-video file '{}'", path.display());
            continue;
        }
        items.push(WorkItem::local(path));
    }

    items.sort_by_cached_key(|item| item.display_name.to_lowercase());
    info!(
        folder = %source_folder.display(),
        "detected {} video files",
        items.len()
    );
    Ok(items)
}

/// Ordered, mutable list of pending work items.
///
/// Positions are 0-based except for [`ItemRegistry::move_to_position`],
/// whose target is the 1-based position shown to users.
#[derive(Debug, Clone, Default)]
pub struct ItemRegistry {
    items: Vec<WorkItem>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<WorkItem>) -> Self {
        Self { items }
    }

    /// Replace the registry contents with the videos found in `source_folder`
    pub fn detect(&mut self, source_folder: &Path) -> Result<&[WorkItem]> {
        self.items = detect_video_files(source_folder)?;
        Ok(&self.items)
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [WorkItem] {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WorkItem> {
        self.items.get(index)
    }

    pub fn push(&mut self, item: WorkItem) {
        self.items.push(item);
    }

    /// Insert before `index`; `index == len()` appends.
    pub fn insert(&mut self, index: usize, item: WorkItem) -> bool {
        if index > self.items.len() {
            return false;
        }
        self.items.insert(index, item);
        true
    }

    /// Swap with the previous item; `false` for the first item or out of range
    pub fn move_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.items.len() {
            return false;
        }
        self.items.swap(index, index - 1);
        true
    }

    /// Swap with the next item; `false` for the last item or out of range
    pub fn move_down(&mut self, index: usize) -> bool {
        if index >= self.items.len().saturating_sub(1) {
            return false;
        }
        self.items.swap(index, index + 1);
        true
    }

    /// Move to a 1-based position; `false` when either end is out of range
    pub fn move_to_position(&mut self, from_index: usize, to_position: usize) -> bool {
        let len = self.items.len();
        if from_index >= len || to_position < 1 || to_position > len {
            return false;
        }
        let item = self.items.remove(from_index);
        self.items.insert(to_position - 1, item);
        true
    }

    /// Remove and return the item at `index`
    pub fn remove(&mut self, index: usize) -> Option<WorkItem> {
        if index >= self.items.len() {
            return None;
        }
        Some(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Load remote episodes from a JSON list and append them.
    ///
    /// Entries without a name are called `Episode N` with N counted from
    /// `first_number`.
    pub fn load_episode_list(&mut self, path: &Path, first_number: u32) -> Result<usize> {
        let content = std::fs::read_to_string(path).map_err(|e| OrganizerError::io(path, e))?;
        let entries: Vec<EpisodeEntry> = serde_json::from_str(&content)?;

        let mut loaded = Vec::with_capacity(entries.len());
        for entry in entries {
            let number = episode_number(first_number, self.items.len() + loaded.len());
            let name = entry
                .name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| format!("Episode {number}"));
            loaded.push(WorkItem::remote(&entry.url, name)?);
        }

        let count = loaded.len();
        self.items.extend(loaded);
        info!(path = %path.display(), "loaded {count} remote episodes");
        Ok(count)
    }

    /// Save the remote items as a JSON episode list; local items are skipped.
    pub fn save_episode_list(&self, path: &Path) -> Result<usize> {
        let entries: Vec<EpisodeEntry> = self
            .items
            .iter()
            .filter_map(|item| match &item.source {
                ItemSource::Remote(url) => Some(EpisodeEntry {
                    url: url.clone(),
                    name: Some(item.display_name.clone()),
                }),
                ItemSource::Local(_) => None,
            })
            .collect();

        let content = serde_json::to_string_pretty(&entries)?;
        std::fs::write(path, content).map_err(|e| OrganizerError::io(path, e))?;
        Ok(entries.len())
    }
}
