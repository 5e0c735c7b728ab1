use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::OrganizerError;

/// What a run does with each item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OperationMode {
    /// Plain copy under the episode name; never touches the transcoder
    #[default]
    Rename,
    /// Re-encode video (and optionally select audio)
    Convert,
    /// Drop the video stream and re-encode audio only
    ExtractAudio,
}

impl OperationMode {
    /// Rename only copies files
    pub fn needs_transcoder(&self) -> bool {
        !matches!(self, OperationMode::Rename)
    }
}

/// Target output resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Resolution {
    #[default]
    #[serde(rename = "original")]
    Original,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
}

impl Resolution {
    /// `width:height` for the scale filter, `None` keeps the source size
    pub fn scale(&self) -> Option<&'static str> {
        match self {
            Resolution::Original => None,
            Resolution::P1080 => Some("1920:1080"),
            Resolution::P720 => Some("1280:720"),
            Resolution::P480 => Some("854:480"),
            Resolution::P360 => Some("640:360"),
        }
    }
}

/// How hard the video encoder should squeeze
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    None,
    Low,
    #[default]
    Medium,
    High,
    Maximum,
}

impl CompressionLevel {
    /// Constant-rate-factor value; lower is higher quality and larger output.
    pub fn crf(&self) -> Option<u8> {
        match self {
            CompressionLevel::None => None,
            CompressionLevel::Low => Some(18),
            CompressionLevel::Medium => Some(23),
            CompressionLevel::High => Some(28),
            CompressionLevel::Maximum => Some(35),
        }
    }
}

/// Audio stream handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AudioMode {
    #[default]
    KeepAll,
    SelectTrack(usize),
    ExtractAll,
}

/// Output format for extracted audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Aac,
    Wav,
    /// Anything else keeps its extension but is encoded as MP3
    Other(String),
}

impl AudioFormat {
    pub fn codec(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 | AudioFormat::Other(_) => "libmp3lame",
            AudioFormat::Aac => "aac",
            AudioFormat::Wav => "pcm_s16le",
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Aac => "aac",
            AudioFormat::Wav => "wav",
            AudioFormat::Other(ext) => ext,
        }
    }
}

impl From<String> for AudioFormat {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "mp3" => AudioFormat::Mp3,
            "aac" => AudioFormat::Aac,
            "wav" => AudioFormat::Wav,
            other => {
                // The extension lands in output file names.
                let ext: String = other.chars().filter(char::is_ascii_alphanumeric).collect();
                if ext.is_empty() {
                    AudioFormat::Mp3
                } else {
                    AudioFormat::Other(ext)
                }
            }
        }
    }
}

impl From<AudioFormat> for String {
    fn from(value: AudioFormat) -> Self {
        value.extension().to_string()
    }
}

/// Encoder settings shared by every item of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TranscodeSettings {
    pub resolution: Resolution,
    pub compression: CompressionLevel,
    pub audio_mode: AudioMode,
    pub audio_format: AudioFormat,
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationMode::Rename => "rename",
            OperationMode::Convert => "convert",
            OperationMode::ExtractAudio => "extract-audio",
        })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resolution::Original => "original",
            Resolution::P1080 => "1080p",
            Resolution::P720 => "720p",
            Resolution::P480 => "480p",
            Resolution::P360 => "360p",
        })
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompressionLevel::None => "none",
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::High => "high",
            CompressionLevel::Maximum => "maximum",
        })
    }
}

impl fmt::Display for AudioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioMode::KeepAll => f.write_str("keep-all"),
            AudioMode::SelectTrack(index) => write!(f, "track:{index}"),
            AudioMode::ExtractAll => f.write_str("extract-all"),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OperationMode {
    type Err = OrganizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "rename" | "copy" => Ok(OperationMode::Rename),
            "convert" => Ok(OperationMode::Convert),
            "extract-audio" | "audio" => Ok(OperationMode::ExtractAudio),
            other => Err(OrganizerError::Validation(format!(
                "unknown operation mode '{other}'"
            ))),
        }
    }
}

impl FromStr for Resolution {
    type Err = OrganizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "original" => Ok(Resolution::Original),
            "1080p" | "1080" => Ok(Resolution::P1080),
            "720p" | "720" => Ok(Resolution::P720),
            "480p" | "480" => Ok(Resolution::P480),
            "360p" | "360" => Ok(Resolution::P360),
            other => Err(OrganizerError::Validation(format!(
                "unknown resolution '{other}'"
            ))),
        }
    }
}

impl FromStr for CompressionLevel {
    type Err = OrganizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(CompressionLevel::None),
            "low" => Ok(CompressionLevel::Low),
            "medium" => Ok(CompressionLevel::Medium),
            "high" => Ok(CompressionLevel::High),
            "maximum" | "max" => Ok(CompressionLevel::Maximum),
            other => Err(OrganizerError::Validation(format!(
                "unknown compression level '{other}'"
            ))),
        }
    }
}

impl FromStr for AudioMode {
    type Err = OrganizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        if let Some(index) = normalized
            .strip_prefix("track:")
            .or_else(|| normalized.strip_prefix("select-track:"))
        {
            return index
                .parse::<usize>()
                .map(AudioMode::SelectTrack)
                .map_err(|_| {
                    OrganizerError::Validation(format!("invalid audio track index '{index}'"))
                });
        }
        match normalized.as_str() {
            "keep-all" | "keep" => Ok(AudioMode::KeepAll),
            "extract-all" => Ok(AudioMode::ExtractAll),
            other => Err(OrganizerError::Validation(format!(
                "unknown audio mode '{other}'"
            ))),
        }
    }
}

impl FromStr for AudioFormat {
    type Err = OrganizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(OrganizerError::Validation("empty audio format".into()));
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(OrganizerError::Validation(format!(
                "audio format '{s}' must be a plain extension such as mp3"
            )));
        }
        Ok(AudioFormat::from(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crf_scale_is_inverse_quality() {
        assert_eq!(CompressionLevel::None.crf(), None);
        assert_eq!(CompressionLevel::Low.crf(), Some(18));
        assert_eq!(CompressionLevel::Medium.crf(), Some(23));
        assert_eq!(CompressionLevel::High.crf(), Some(28));
        assert_eq!(CompressionLevel::Maximum.crf(), Some(35));
    }

    #[test]
    fn test_resolution_scale() {
        assert_eq!(Resolution::Original.scale(), None);
        assert_eq!(Resolution::P720.scale(), Some("1280:720"));
        assert_eq!(Resolution::P360.scale(), Some("640:360"));
    }

    #[test]
    fn test_unknown_audio_format_encodes_as_mp3() {
        let format: AudioFormat = "OGG".parse().unwrap();
        assert_eq!(format, AudioFormat::Other("ogg".into()));
        assert!("x/../y".parse::<AudioFormat>().unwrap_err().is_validation());
        assert!(".ogg".parse::<AudioFormat>().is_err());
        assert_eq!(
            AudioFormat::from("x/../y".to_string()),
            AudioFormat::Other("xy".into())
        );
        assert_eq!(AudioFormat::from("../".to_string()), AudioFormat::Mp3);
        assert_eq!(format.codec(), "libmp3lame");
        assert_eq!(format.extension(), "ogg");
        assert_eq!(AudioFormat::Wav.codec(), "pcm_s16le");
    }

    #[test]
    fn test_parse_audio_mode() {
        assert_eq!("keep-all".parse::<AudioMode>().unwrap(), AudioMode::KeepAll);
        assert_eq!("track:2".parse::<AudioMode>().unwrap(), AudioMode::SelectTrack(2));
        assert_eq!("extract_all".parse::<AudioMode>().unwrap(), AudioMode::ExtractAll);
        assert!("track:x".parse::<AudioMode>().is_err());
    }

    #[test]
    fn test_settings_deserialize_from_json() {
        let settings: TranscodeSettings = serde_json::from_str(
            r#"{"resolution":"720p","compression":"high","audio_mode":{"select-track":1},"audio_format":"aac"}"#,
        )
        .unwrap();
        assert_eq!(settings.resolution, Resolution::P720);
        assert_eq!(settings.compression, CompressionLevel::High);
        assert_eq!(settings.audio_mode, AudioMode::SelectTrack(1));
        assert_eq!(settings.audio_format, AudioFormat::Aac);
    }
}
