use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::sanitize_filename;
use crate::{OrganizerError, Result};

/// Naming scope of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesIdentity {
    pub name: String,
    pub year: Option<String>,
    /// Catalog id; rendered as `[tmdbid-{id}]` unless it already names its provider
    pub external_id: Option<String>,
    pub season: u32,
    pub start_episode: u32,
}

impl SeriesIdentity {
    /// Season 1, numbered from episode 1
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            year: None,
            external_id: None,
            season: 1,
            start_episode: 1,
        }
    }

    /// Check the name, season and start episode before a run
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(OrganizerError::Validation("series name is empty".into()));
        }
        if self.season < 1 {
            return Err(OrganizerError::Validation("season must be at least 1".into()));
        }
        if self.start_episode < 1 {
            return Err(OrganizerError::Validation(
                "start episode must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Series name made safe for a path component
    pub fn file_stem_name(&self) -> String {
        sanitize_filename(self.name.trim())
    }

    /// `Name (Year) [tmdbid-ID]`
    pub fn series_folder_name(&self) -> String {
        let mut folder = self.name.trim().to_string();
        if let Some(year) = self.year.as_deref().map(str::trim).filter(|y| !y.is_empty()) {
            folder.push_str(&format!(" ({year})"));
        }
        if let Some(id) = self
            .external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            if id.contains('-') {
                folder.push_str(&format!(" [{id}]"));
            } else {
                folder.push_str(&format!(" [tmdbid-{id}]"));
            }
        }
        sanitize_filename(&folder)
    }

    /// `Season 01`
    pub fn season_folder_name(&self) -> String {
        format!("Season {:02}", self.season)
    }
}

/// Destination directory for a run, without touching the filesystem
pub fn resolve_output_dir(
    output_root: &Path,
    identity: &SeriesIdentity,
    structured: bool,
) -> PathBuf {
    if structured {
        output_root
            .join(identity.series_folder_name())
            .join(identity.season_folder_name())
    } else {
        output_root.join(identity.file_stem_name())
    }
}

/// Resolve the destination directory and create it with all parents
pub fn ensure_output_dir(
    output_root: &Path,
    identity: &SeriesIdentity,
    structured: bool,
) -> Result<PathBuf> {
    let dir = resolve_output_dir(output_root, identity, structured);
    std::fs::create_dir_all(&dir).map_err(|e| OrganizerError::io(&dir, e))?;
    debug!(dir = %dir.display(), "output directory ready");
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn identity() -> SeriesIdentity {
        SeriesIdentity {
            name: "Breaking Bad".into(),
            year: Some("2008".into()),
            external_id: Some("1396".into()),
            season: 2,
            start_episode: 1,
        }
    }

    #[test]
    fn test_structured_layout() {
        let dir = resolve_output_dir(Path::new("/library"), &identity(), true);
        assert_eq!(
            dir,
            PathBuf::from("/library/Breaking Bad (2008) [tmdbid-1396]/Season 02")
        );
    }

    #[test]
    fn test_structured_layout_without_optional_parts() {
        let dir = resolve_output_dir(Path::new("/library"), &SeriesIdentity::new("Show"), true);
        assert_eq!(dir, PathBuf::from("/library/Show/Season 01"));
    }

    #[test]
    fn test_provider_prefixed_id_is_kept() {
        let mut id = identity();
        id.external_id = Some("tvdbid-81189".into());
        assert_eq!(id.series_folder_name(), "Breaking Bad (2008) [tvdbid-81189]");
    }

    #[test]
    fn test_flat_layout() {
        let dir = resolve_output_dir(Path::new("/out"), &identity(), false);
        assert_eq!(dir, PathBuf::from("/out/Breaking Bad"));
    }

    #[test]
    fn test_ensure_creates_nested_dirs() {
        let root = tempdir().unwrap();
        let dir = ensure_output_dir(&root.path().join("deep/er"), &identity(), true).unwrap();
        assert!(dir.is_dir());
        assert!(dir.ends_with("Season 02"));
    }

    #[test]
    fn test_validate() {
        assert!(identity().validate().is_ok());
        assert!(SeriesIdentity::new("  ").validate().unwrap_err().is_validation());
        let mut zero_season = identity();
        zero_season.season = 0;
        assert!(zero_season.validate().is_err());
    }
}
