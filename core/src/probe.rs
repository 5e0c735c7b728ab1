use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::registry::{AudioTrack, WorkItem};
use crate::utils::is_multi_track_container;
use crate::{OrganizerError, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize, Debug)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize, Debug)]
struct ProbeStream {
    codec_name: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Discovers audio tracks with the companion probe tool
#[derive(Debug, Clone)]
pub struct AudioProbe {
    program: PathBuf,
}

impl AudioProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Audio streams of `path` in container order
    pub async fn audio_tracks(&self, path: &Path) -> Result<Vec<AudioTrack>> {
        let mut command = Command::new(&self.program);
        #[rustfmt::skip]
        command
            .args([
                "-v", "quiet",
                "-print_format", "json",
                "-show_streams",
                "-select_streams", "a",
            ])
            .arg(path)
            .kill_on_drop(true);

        let output = tokio::time::timeout(PROBE_TIMEOUT, command.output())
            .await
            .map_err(|_| {
                OrganizerError::Validation(format!("probing '{}' timed out", path.display()))
            })?
            .map_err(|source| OrganizerError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(OrganizerError::Validation(format!(
                "probe failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_audio_tracks(&output.stdout)
    }

    /// Fill `audio_tracks` for every local multi-track container.
    ///
    /// A failed probe leaves that item's list empty. Returns the number of
    /// items that were probed successfully.
    pub async fn populate(&self, items: &mut [WorkItem]) -> usize {
        let mut probed = 0;
        for item in items.iter_mut() {
            let Some(path) = item.local_path().map(Path::to_path_buf) else {
                continue;
            };
            if !is_multi_track_container(&path) {
                continue;
            }
            match self.audio_tracks(&path).await {
                Ok(tracks) => {
                    debug!(path = %path.display(), "found {} audio tracks", tracks.len());
                    item.audio_tracks = tracks;
                    probed += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), "could not read audio tracks: {e}");
                    item.audio_tracks.clear();
                }
            }
        }
        probed
    }
}

/// Audio tracks from the probe tool's JSON stream listing
pub fn parse_audio_tracks(json: &[u8]) -> Result<Vec<AudioTrack>> {
    let output: ProbeOutput = serde_json::from_slice(json)?;
    Ok(output
        .streams
        .into_iter()
        .enumerate()
        .map(|(index, mut stream)| AudioTrack {
            index,
            codec: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
            language: stream
                .tags
                .remove("language")
                .unwrap_or_else(|| "und".to_string()),
            title: stream
                .tags
                .remove("title")
                .unwrap_or_else(|| format!("Audio {}", index + 1)),
            channels: stream.channels.unwrap_or(0),
            sample_rate: stream
                .sample_rate
                .and_then(|rate| rate.parse().ok())
                .unwrap_or(0),
        })
        .collect())
}
