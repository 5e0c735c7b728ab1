use anyhow::{bail, Context, Result};
use colored::*;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use seriesorg_core::{AudioFormat, CompressionLevel, Resolution};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "seriesorg";
const CONFIG_FILE: &str = "config.json";
const ENV_PREFIX: &str = "SERIESORG";

/// User preferences; command-line flags take precedence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub output_directory: Option<PathBuf>,
    pub resolution: Resolution,
    pub compression: CompressionLevel,
    pub audio_format: AudioFormat,
    pub structured_layout: bool,
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_directory: None,
            resolution: Resolution::Original,
            compression: CompressionLevel::Medium,
            audio_format: AudioFormat::Mp3,
            structured_layout: true,
            ffmpeg_path: None,
        }
    }
}

impl Settings {
    /// Defaults, then the config file, then `SERIESORG_*` environment variables
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path() {
            builder = builder.add_source(File::from(path).format(FileFormat::Json).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(settings)
    }

    fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Update one key from its textual value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "output_directory" => self.output_directory = optional_path(value),
            "resolution" => self.resolution = value.parse()?,
            "compression" => self.compression = value.parse()?,
            "audio_format" => self.audio_format = value.parse()?,
            "structured_layout" => {
                self.structured_layout = match value.to_lowercase().as_str() {
                    "true" | "yes" | "on" | "1" => true,
                    "false" | "no" | "off" | "0" => false,
                    other => bail!("'{other}' is not a boolean"),
                }
            }
            "ffmpeg_path" => self.ffmpeg_path = optional_path(value),
            other => bail!(
                "Unknown configuration key '{other}' (expected one of: output_directory, resolution, \
                 compression, audio_format, structured_layout, ffmpeg_path)"
            ),
        }
        Ok(())
    }
}

fn optional_path(value: &str) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

fn require_config_path() -> Result<PathBuf> {
    config_path().context("No configuration directory on this system")
}

pub fn show_config() -> Result<()> {
    let settings = Settings::load()?;
    println!("{}", "⚙️  Configuration".cyan().bold());
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

pub fn set_config(key: &str, value: &str) -> Result<()> {
    let path = require_config_path()?;
    let mut settings = Settings::load_file(&path)?;
    settings.set(key, value)?;
    settings.save(&path)?;
    println!("✅ {} = {}", key.green(), value);
    Ok(())
}

pub fn reset_config() -> Result<()> {
    let path = require_config_path()?;
    Settings::default().save(&path)?;
    println!("✅ Configuration reset to defaults");
    Ok(())
}

pub fn show_config_path() -> Result<()> {
    println!("{}", require_config_path()?.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_set_known_keys() {
        let mut settings = Settings::default();
        settings.set("resolution", "720p").unwrap();
        settings.set("compression", "high").unwrap();
        settings.set("audio_format", "aac").unwrap();
        settings.set("structured_layout", "no").unwrap();
        settings.set("output_directory", "/media/tv").unwrap();

        assert_eq!(settings.resolution, Resolution::P720);
        assert_eq!(settings.compression, CompressionLevel::High);
        assert_eq!(settings.audio_format, AudioFormat::Aac);
        assert!(!settings.structured_layout);
        assert_eq!(settings.output_directory, Some(PathBuf::from("/media/tv")));

        settings.set("output_directory", "").unwrap();
        assert_eq!(settings.output_directory, None);
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut settings = Settings::default();
        assert!(settings.set("resolution", "4k").is_err());
        assert!(settings.set("structured_layout", "maybe").is_err());
        assert!(settings.set("theme", "dark").is_err());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        assert_eq!(Settings::load_file(&path).unwrap(), Settings::default());

        let mut settings = Settings::default();
        settings.set("ffmpeg_path", "/opt/ffmpeg/bin/ffmpeg").unwrap();
        settings.save(&path).unwrap();
        assert_eq!(Settings::load_file(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"resolution": "480p"}"#).unwrap();
        let settings = Settings::load_file(&path).unwrap();
        assert_eq!(settings.resolution, Resolution::P480);
        assert_eq!(settings.compression, CompressionLevel::Medium);
        assert!(settings.structured_layout);
    }
}
