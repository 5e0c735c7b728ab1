pub mod batch;
pub mod cancel;
pub mod converter;
pub mod error;
pub mod events;
pub mod layout;
pub mod locator;
pub mod monitor;
pub mod numbering;
pub mod probe;
pub mod progress;
pub mod quality;
pub mod registry;
pub mod utils;

pub use batch::*;
pub use cancel::CancelToken;
pub use converter::{build_command, TranscodeCommand, TranscodeRequest};
pub use error::{OrganizerError, Result};
pub use events::*;
pub use layout::*;
pub use locator::*;
pub use monitor::{MonitorOutcome, MonitorState, MonitorUpdate, TranscodeMonitor};
pub use numbering::*;
pub use probe::AudioProbe;
pub use quality::*;
pub use registry::*;
pub use utils::*;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Item list, series identity and batch runner behind one API.
///
/// Registry mutations are refused with [`OrganizerError::State`] while a run
/// is active.
pub struct SeriesOrganizer {
    registry: ItemRegistry,
    identity: SeriesIdentity,
    locator: Box<dyn ToolLocator>,
    processor: BatchProcessor,
}

impl SeriesOrganizer {
    /// Create an organizer reporting to `sink`
    pub fn new(sink: Arc<dyn EventSink>, locator: impl ToolLocator + 'static) -> Self {
        Self {
            registry: ItemRegistry::new(),
            identity: SeriesIdentity::new(""),
            locator: Box::new(locator),
            processor: BatchProcessor::new(sink),
        }
    }

    pub fn registry(&self) -> &ItemRegistry {
        &self.registry
    }

    /// Items in episode order
    pub fn items(&self) -> &[WorkItem] {
        self.registry.items()
    }

    pub fn identity(&self) -> &SeriesIdentity {
        &self.identity
    }

    /// Replace the naming scope; refused while running
    pub fn set_identity(&mut self, identity: SeriesIdentity) -> Result<()> {
        self.ensure_idle()?;
        self.identity = identity;
        Ok(())
    }

    pub fn state(&self) -> RunState {
        self.processor.state()
    }

    /// Replace the item list with the video files of `folder`
    pub fn detect(&mut self, folder: &Path) -> Result<&[WorkItem]> {
        self.ensure_idle()?;
        self.registry.detect(folder)
    }

    /// Append a remote episode, named `Episode N` when no name is given
    pub fn add_remote_episode(&mut self, url: &str, name: Option<&str>) -> Result<()> {
        self.ensure_idle()?;
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => format!("Episode {}", self.next_episode_number()),
        };
        self.registry.push(WorkItem::remote(url, name)?);
        Ok(())
    }

    /// Append the entries of a saved episode list; returns how many were added
    pub fn load_episode_list(&mut self, path: &Path) -> Result<usize> {
        self.ensure_idle()?;
        self.registry
            .load_episode_list(path, self.identity.start_episode)
    }

    pub fn save_episode_list(&self, path: &Path) -> Result<usize> {
        self.registry.save_episode_list(path)
    }

    /// Swap with the previous item; `false` at the top
    pub fn move_up(&mut self, index: usize) -> Result<bool> {
        self.ensure_idle()?;
        Ok(self.registry.move_up(index))
    }

    /// Swap with the next item; `false` at the bottom
    pub fn move_down(&mut self, index: usize) -> Result<bool> {
        self.ensure_idle()?;
        Ok(self.registry.move_down(index))
    }

    /// Move the item at `from_index` to the 1-based `to_position`
    pub fn move_to_position(&mut self, from_index: usize, to_position: usize) -> Result<bool> {
        self.ensure_idle()?;
        Ok(self.registry.move_to_position(from_index, to_position))
    }

    /// Drop the item at `index`; later items are renumbered
    pub fn remove(&mut self, index: usize) -> Result<Option<WorkItem>> {
        self.ensure_idle()?;
        Ok(self.registry.remove(index))
    }

    pub fn clear(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.registry.clear();
        Ok(())
    }

    /// Episode number currently implied for the item at `index`
    pub fn episode_number(&self, index: usize) -> Option<u32> {
        (index < self.registry.len())
            .then(|| episode_number(self.identity.start_episode, index))
    }

    /// Give the item at `index` the number `episode`, shifting every other item
    pub fn update_episode_number(&mut self, index: usize, episode: u32) -> Result<()> {
        self.ensure_idle()?;
        if index >= self.registry.len() {
            return Err(OrganizerError::Validation(format!(
                "no item at position {}",
                index + 1
            )));
        }
        self.identity.start_episode = reanchor(index, episode)?;
        Ok(())
    }

    /// Anchor numbering on the episode number found in the first item's name
    pub fn guess_start_episode(&mut self) -> Result<Option<u32>> {
        self.ensure_idle()?;
        let guess = self
            .registry
            .get(0)
            .and_then(|item| guess_episode_number(&item.display_name))
            .filter(|n| *n >= 1);
        if let Some(start) = guess {
            info!("numbering from guessed episode {start}");
            self.identity.start_episode = start;
        }
        Ok(guess)
    }

    /// Output names every item would get under `config`
    pub fn planned_names(&self, config: &RunConfig) -> Vec<String> {
        self.registry
            .items()
            .iter()
            .enumerate()
            .map(|(index, item)| planned_file_name(item, index, &self.identity, config))
            .collect()
    }

    pub fn locate_tool(&self) -> Option<PathBuf> {
        self.locator.locate()
    }

    /// Discover audio tracks of local multi-track containers.
    ///
    /// Returns the number of items probed, 0 when the tool is unavailable.
    pub async fn probe_audio(&mut self) -> Result<usize> {
        self.ensure_idle()?;
        let Some(tool) = self.locate_tool() else {
            return Ok(0);
        };
        let probe = AudioProbe::new(companion_tool(&tool, "ffprobe"));
        Ok(probe.populate(self.registry.items_mut()).await)
    }

    /// Start a run over a snapshot of the current items.
    ///
    /// When `config.tool` is unset and the mode needs the transcoder, the
    /// locator is consulted once here.
    pub fn start(&self, mut config: RunConfig) -> Result<RunHandle> {
        if config.tool.is_none() && config.mode.needs_transcoder() {
            config.tool = self.locate_tool();
        }
        self.processor.start_run(
            self.registry.items().to_vec(),
            self.identity.clone(),
            config,
        )
    }

    /// Ask the active run to stop; `false` when idle
    pub fn cancel(&self) -> bool {
        self.processor.request_cancel()
    }

    fn next_episode_number(&self) -> u32 {
        episode_number(self.identity.start_episode, self.registry.len())
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.processor.is_running() {
            return Err(OrganizerError::State(
                "the item list cannot change while a run is active".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn organizer() -> SeriesOrganizer {
        SeriesOrganizer::new(Arc::new(NullSink), FixedToolLocator(None))
    }

    #[test]
    fn test_numbering_follows_position() {
        let dir = tempdir().unwrap();
        for name in ["c.mkv", "a.mkv", "b.mkv"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let mut organizer = organizer();
        organizer.set_identity(SeriesIdentity::new("Show")).unwrap();
        organizer.detect(dir.path()).unwrap();

        let config = RunConfig::default();
        assert_eq!(
            organizer.planned_names(&config),
            ["Show - S01E01.mkv", "Show - S01E02.mkv", "Show - S01E03.mkv"]
        );

        assert!(organizer.move_to_position(2, 1).unwrap());
        assert_eq!(organizer.items()[0].display_name, "c.mkv");
        assert_eq!(organizer.episode_number(0), Some(1));

        organizer.update_episode_number(2, 10).unwrap();
        assert_eq!(organizer.identity().start_episode, 8);
        assert_eq!(organizer.episode_number(0), Some(8));
        assert_eq!(organizer.episode_number(3), None);

        let err = organizer.update_episode_number(2, 1).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(organizer.identity().start_episode, 8);
    }

    #[test]
    fn test_remote_episode_default_name() {
        let mut organizer = organizer();
        organizer
            .add_remote_episode("https://cdn.example.com/1.m3u8", None)
            .unwrap();
        organizer
            .add_remote_episode("https://cdn.example.com/2.m3u8", Some("Finale"))
            .unwrap();
        assert_eq!(organizer.items()[0].display_name, "Episode 1");
        assert_eq!(organizer.items()[1].display_name, "Finale");
        assert!(organizer
            .add_remote_episode("file:///etc/passwd", None)
            .is_err());
    }

    #[test]
    fn test_guess_start_episode() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Show - Episode 7.mkv"), b"").unwrap();
        let mut organizer = organizer();
        organizer.detect(dir.path()).unwrap();
        assert_eq!(organizer.guess_start_episode().unwrap(), Some(7));
        assert_eq!(organizer.identity().start_episode, 7);
    }

    #[tokio::test]
    async fn test_convert_without_tool_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.mkv"), b"").unwrap();
        let mut organizer = organizer();
        organizer.set_identity(SeriesIdentity::new("Show")).unwrap();
        organizer.detect(dir.path()).unwrap();
        assert_eq!(organizer.probe_audio().await.unwrap(), 0);

        let config = RunConfig {
            mode: OperationMode::Convert,
            output_directory: dir.path().join("out"),
            ..RunConfig::default()
        };
        assert!(organizer.start(config).unwrap_err().is_validation());
        assert_eq!(organizer.state(), RunState::Idle);
    }
}
