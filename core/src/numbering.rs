//! Position-anchored episode numbering.
//!
//! No item stores its own episode number. The number of the item at
//! position `i` is always `start_episode + i`, so every reorder renumbers
//! the whole list implicitly.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{OrganizerError, Result};

static EPISODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"[Ss]\d{1,2}[Ee](\d+)",
        r"[Ee]pisode[\s_]*(\d+)",
        r"[Ee]p[\s_.]*(\d+)",
        r"[\s_-](\d+)[\s_-]",
        r"^(\d+)[\s_-]",
        r"[\s_-](\d+)$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("episode pattern is valid"))
    .collect()
});

/// Filename convention for produced episodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NamingScheme {
    /// `Show - S01E05.mkv`, understood by media-server scanners
    #[default]
    Standard,
    /// `Show 01x05.mp4`
    Compact,
}

impl NamingScheme {
    pub fn file_name(&self, series_name: &str, season: u32, episode: u32, extension: &str) -> String {
        match self {
            NamingScheme::Standard => episode_file_name(series_name, season, episode, extension),
            NamingScheme::Compact => format!("{series_name} {season:02}x{episode:02}{extension}"),
        }
    }
}

/// Episode number of the item at `position`; saturates at `u32::MAX`
pub fn episode_number(start_episode: u32, position: usize) -> u32 {
    u32::try_from(position)
        .ok()
        .and_then(|offset| start_episode.checked_add(offset))
        .unwrap_or(u32::MAX)
}

/// Fails when `count` items numbered from `start_episode` run past `u32::MAX`.
pub fn check_numbering(start_episode: u32, count: usize) -> Result<()> {
    let last = count.saturating_sub(1);
    let fits = u32::try_from(last)
        .ok()
        .and_then(|offset| start_episode.checked_add(offset))
        .is_some();
    if !fits {
        return Err(OrganizerError::Validation(format!(
            "{count} episodes starting at {start_episode} exceed the highest episode number"
        )));
    }
    Ok(())
}

/// `"{series} - S{season:02}E{episode:02}{extension}"`; `extension` carries its dot.
pub fn episode_file_name(series_name: &str, season: u32, episode: u32, extension: &str) -> String {
    format!("{series_name} - S{season:02}E{episode:02}{extension}")
}

/// Start episode that gives the item at `position` the number `new_episode`.
///
/// Numbers below 1 are rejected rather than clamped.
pub fn reanchor(position: usize, new_episode: u32) -> Result<u32> {
    let start = i64::from(new_episode) - position as i64;
    if start < 1 {
        return Err(OrganizerError::Validation(format!(
            "episode {new_episode} at position {} would number the first item {start}",
            position + 1
        )));
    }
    Ok(start as u32)
}

/// Best-effort episode number from a file name such as `Show - 05.mkv`.
pub fn guess_episode_number(file_name: &str) -> Option<u32> {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());

    EPISODE_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(&stem)
            .and_then(|captures| captures[1].parse::<u32>().ok())
    })
}
