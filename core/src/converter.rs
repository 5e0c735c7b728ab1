use std::path::{Path, PathBuf};

use crate::quality::{AudioMode, OperationMode, TranscodeSettings};
use crate::registry::{AudioTrack, ItemSource};

/// Video encoder used whenever the video stream is re-encoded
pub const VIDEO_CODEC: &str = "libx264";
const VIDEO_PRESET: &str = "medium";

/// Everything the builder needs to know about one item
#[derive(Debug, Clone)]
pub struct TranscodeRequest<'a> {
    pub mode: OperationMode,
    pub settings: &'a TranscodeSettings,
    pub source: &'a ItemSource,
    pub audio_tracks: &'a [AudioTrack],
    /// Final output path, extension included
    pub output: &'a Path,
}

/// A fully-formed transcoder invocation
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Files the tool is expected to produce; all must exist for success
    pub outputs: Vec<PathBuf>,
    /// Fallbacks taken while building, to be logged by the caller
    pub warnings: Vec<String>,
}

impl TranscodeCommand {
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Value following `flag`, if present
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Shell-like rendering for logs; not meant to be executed
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().map(|arg| {
                if arg.contains(' ') {
                    format!("\"{arg}\"")
                } else {
                    arg.clone()
                }
            }))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Build the transcoder command for `request`.
///
/// `Rename` needs no external tool and yields `None`.
pub fn build_command(program: &Path, request: &TranscodeRequest<'_>) -> Option<TranscodeCommand> {
    let mut builder = match request.mode {
        OperationMode::Rename => return None,
        _ => CommandBuilder::new(program, request),
    };
    match request.mode {
        OperationMode::Convert => builder.convert(),
        OperationMode::ExtractAudio => builder.extract_audio(),
        OperationMode::Rename => {}
    }
    Some(builder.finish())
}

struct CommandBuilder<'a> {
    request: &'a TranscodeRequest<'a>,
    command: TranscodeCommand,
}

impl<'a> CommandBuilder<'a> {
    fn new(program: &Path, request: &'a TranscodeRequest<'a>) -> Self {
        #[rustfmt::skip]
        let args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-y".to_string(),
            "-i".to_string(), request.source.input_spec(),
            "-progress".to_string(), "pipe:1".to_string(),
        ];

        Self {
            request,
            command: TranscodeCommand {
                program: program.to_path_buf(),
                args,
                outputs: Vec::new(),
                warnings: Vec::new(),
            },
        }
    }

    fn push<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.args.extend(args.into_iter().map(Into::into));
    }

    fn push_output(&mut self, path: PathBuf) {
        self.command.args.push(path.to_string_lossy().into_owned());
        self.command.outputs.push(path);
    }

    fn warn(&mut self, message: String) {
        self.command.warnings.push(message);
    }

    /// Resolve a requested audio track against the discovered ones.
    ///
    /// `None` means no tracks were discovered and the tool default applies.
    fn checked_track(&mut self, requested: usize) -> Option<usize> {
        let available = self.request.audio_tracks.len();
        if available == 0 {
            self.warn(format!(
                "audio track {requested} requested but no tracks were discovered, using default audio handling"
            ));
            None
        } else if requested >= available {
            self.warn(format!(
                "audio track {requested} does not exist ({available} available), using track 0"
            ));
            Some(0)
        } else {
            Some(requested)
        }
    }

    fn convert(&mut self) {
        let settings = self.request.settings;
        let scale = settings.resolution.scale();
        let crf = settings.compression.crf();

        if scale.is_none() && crf.is_none() {
            self.push(["-c:v", "copy"]);
        } else {
            self.push(["-c:v", VIDEO_CODEC, "-preset", VIDEO_PRESET]);
            if let Some(crf) = crf {
                self.push(["-crf".to_string(), crf.to_string()]);
            }
            if let Some(scale) = scale {
                self.push(["-vf".to_string(), format!("scale={scale}")]);
            }
        }

        match settings.audio_mode {
            AudioMode::SelectTrack(requested) => match self.checked_track(requested) {
                Some(track) => {
                    self.push(["-map".to_string(), "0:v:0".to_string()]);
                    self.push(["-map".to_string(), format!("0:a:{track}")]);
                    self.push(["-c:a", "copy"]);
                }
                None => self.push(["-c:a", "copy"]),
            },
            AudioMode::KeepAll | AudioMode::ExtractAll => {
                // Remote playlists expose every variant as a stream, so only
                // local files map all audio explicitly.
                if !self.request.source.is_remote() {
                    self.push(["-map", "0:v:0?", "-map", "0:a?"]);
                }
                self.push(["-c:a", "copy"]);
            }
        }

        self.push_output(self.request.output.to_path_buf());
    }

    fn extract_audio(&mut self) {
        let codec = self.request.settings.audio_format.codec();

        match self.request.settings.audio_mode {
            AudioMode::KeepAll => {
                self.push(["-vn", "-acodec", codec]);
                self.push_output(self.request.output.to_path_buf());
            }
            AudioMode::SelectTrack(requested) => {
                if let Some(track) = self.checked_track(requested) {
                    self.push(["-map".to_string(), format!("0:a:{track}")]);
                }
                self.push(["-vn", "-acodec", codec]);
                self.push_output(self.request.output.to_path_buf());
            }
            AudioMode::ExtractAll => {
                let tracks = self.request.audio_tracks;
                if tracks.is_empty() {
                    self.warn(
                        "no audio tracks were discovered, extracting the default audio stream"
                            .to_string(),
                    );
                    self.push(["-vn", "-acodec", codec]);
                    self.push_output(self.request.output.to_path_buf());
                    return;
                }
                for (position, track) in tracks.iter().enumerate() {
                    let output = track_output_path(self.request.output, position + 1, track);
                    self.push(["-map".to_string(), format!("0:a:{}", track.index)]);
                    self.push(["-vn", "-acodec", codec]);
                    self.push_output(output);
                }
            }
        }
    }

    fn finish(self) -> TranscodeCommand {
        self.command
    }
}

/// `Show - S01E01 - Track 2 (jpn).mp3` next to `base`
pub fn track_output_path(base: &Path, number: usize, track: &AudioTrack) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = base
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    base.with_file_name(format!(
        "{stem} - Track {number} ({}){extension}",
        track.language
    ))
}
