use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Finds the transcoder executable; resolved once before a run starts
pub trait ToolLocator: Send + Sync {
    fn locate(&self) -> Option<PathBuf>;
}

/// A locator with a predetermined answer
#[derive(Debug, Clone, Default)]
pub struct FixedToolLocator(pub Option<PathBuf>);

impl ToolLocator for FixedToolLocator {
    fn locate(&self) -> Option<PathBuf> {
        self.0.clone()
    }
}

/// Looks in a few bundled-tool folders relative to the working directory,
/// then in every directory of `PATH`.
#[derive(Debug, Clone)]
pub struct SystemToolLocator {
    program: String,
    candidates: Vec<PathBuf>,
    search_path: Option<OsString>,
}

impl SystemToolLocator {
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        let file_name = executable_name(&program);
        let candidates = [
            "bin",
            "ffmpeg/bin",
            "../bin",
            "../ffmpeg/bin",
            "util",
            "utils",
            "tools",
            ".",
        ]
        .iter()
        .map(|dir| Path::new(dir).join(&file_name))
        .collect();

        Self {
            program,
            candidates,
            search_path: std::env::var_os("PATH"),
        }
    }

    pub fn ffmpeg() -> Self {
        Self::new("ffmpeg")
    }

    /// Replace the bundled-tool candidates
    pub fn with_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Search these directories instead of `PATH`
    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    /// Relative candidates are skipped when `working_dir` is unknown.
    fn locate_from(&self, working_dir: Option<&Path>) -> Option<PathBuf> {
        for candidate in &self.candidates {
            debug!("probing {}", candidate.display());
            if !candidate.is_file() {
                continue;
            }
            let absolute = if candidate.is_absolute() {
                candidate.clone()
            } else if let Some(dir) = working_dir {
                dir.join(candidate)
            } else {
                debug!("no working directory to resolve {}", candidate.display());
                continue;
            };
            debug!("found {} at {}", self.program, absolute.display());
            return Some(absolute);
        }

        let file_name = executable_name(&self.program);
        let search_path = self.search_path.as_ref()?;
        std::env::split_paths(search_path)
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
    }
}

impl ToolLocator for SystemToolLocator {
    fn locate(&self) -> Option<PathBuf> {
        self.locate_from(std::env::current_dir().ok().as_deref())
    }
}

/// The probe tool that ships next to the transcoder (`ffprobe` beside `ffmpeg`)
pub fn companion_tool(tool: &Path, companion: &str) -> PathBuf {
    let Some(file_name) = tool.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return PathBuf::from(executable_name(companion));
    };
    let renamed = if file_name.contains("ffmpeg") {
        file_name.replace("ffmpeg", companion)
    } else {
        executable_name(companion)
    };
    tool.with_file_name(renamed)
}

fn executable_name(program: &str) -> String {
    format!("{program}{}", std::env::consts::EXE_SUFFIX)
}
