use clap::{Args, Parser, Subcommand};
use seriesorg_core::{AudioFormat, AudioMode, CompressionLevel, OperationMode, Resolution};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "seriesorg")]
#[command(about = "Organize, rename and convert episodic video batches")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output directory (default: configured directory, then current directory)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the episodes detected in a folder
    Scan(ScanArgs),

    /// Rename, convert or extract audio from a folder of episodes
    Organize(OrganizeArgs),

    /// Download a list of remote episodes
    Series(SeriesArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Naming scope shared by every command that produces episodes
#[derive(Args)]
pub struct IdentityArgs {
    /// Series name (default: the source folder's name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Release year, shown in the series folder
    #[arg(long)]
    pub year: Option<String>,

    /// Catalog id, e.g. 81189 or tvdbid-81189
    #[arg(long)]
    pub id: Option<String>,

    /// Season number
    #[arg(short, long, default_value = "1")]
    pub season: u32,

    /// Episode number of the first item
    #[arg(long, default_value = "1")]
    pub start: u32,
}

#[derive(Args)]
pub struct ScanArgs {
    /// Folder containing the episodes
    pub folder: PathBuf,

    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Number from the episode found in the first file name
    #[arg(long)]
    pub guess_start: bool,

    /// List audio tracks of multi-track containers (needs ffprobe)
    #[arg(long)]
    pub tracks: bool,

    /// Output format (table, json)
    #[arg(long, default_value = "table")]
    pub format: String,
}

#[derive(Args)]
pub struct OrganizeArgs {
    /// Folder containing the episodes
    pub folder: PathBuf,

    #[command(flatten)]
    pub identity: IdentityArgs,

    /// What to do with each file (rename, convert, extract-audio)
    #[arg(short, long, default_value = "rename")]
    pub mode: OperationMode,

    /// Target resolution (original, 1080p, 720p, 480p, 360p)
    #[arg(short, long)]
    pub resolution: Option<Resolution>,

    /// Compression level (none, low, medium, high, maximum)
    #[arg(short, long)]
    pub compression: Option<CompressionLevel>,

    /// Audio handling (keep-all, extract-all, track:N)
    #[arg(short, long, default_value = "keep-all")]
    pub audio: AudioMode,

    /// Audio format for extract-audio (mp3, aac, wav)
    #[arg(long)]
    pub audio_format: Option<AudioFormat>,

    /// Write into a single series folder instead of `Series/Season NN`
    #[arg(long)]
    pub flat: bool,

    /// Move an item before numbering, 1-based (FROM:TO); repeatable
    #[arg(long = "move", value_name = "FROM:TO", value_parser = parse_pair)]
    pub moves: Vec<(usize, usize)>,

    /// Drop an item by its 1-based position; repeatable
    #[arg(long = "remove", value_name = "POS")]
    pub remove: Vec<usize>,

    /// Give the item at a 1-based position this episode number (POS:NUM)
    #[arg(long, value_name = "POS:NUM", value_parser = parse_pair)]
    pub episode: Option<(usize, usize)>,

    /// Number from the episode found in the first file name
    #[arg(long)]
    pub guess_start: bool,

    /// Show the planned names without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct SeriesArgs {
    /// Series name
    #[arg(short, long)]
    pub name: String,

    /// Season number
    #[arg(short, long, default_value = "1")]
    pub season: u32,

    /// Episode number of the first item
    #[arg(long, default_value = "1")]
    pub start: u32,

    /// JSON episode list to load ([{"url": .., "name": ..}])
    #[arg(short, long)]
    pub list: Option<PathBuf>,

    /// Episode stream URL; repeatable, appended after the list
    #[arg(short, long = "url")]
    pub urls: Vec<String>,

    /// Save the resulting episode list and exit
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Target resolution (original, 1080p, 720p, 480p, 360p)
    #[arg(short, long)]
    pub resolution: Option<Resolution>,

    /// Compression level (none, low, medium, high, maximum)
    #[arg(short, long)]
    pub compression: Option<CompressionLevel>,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Reset configuration to defaults
    Reset,

    /// Print the configuration file location
    Path,
}

fn parse_pair(value: &str) -> Result<(usize, usize), String> {
    let (left, right) = value
        .split_once(':')
        .ok_or_else(|| format!("expected A:B, got '{value}'"))?;
    let left = left
        .trim()
        .parse()
        .map_err(|_| format!("'{left}' is not a number"))?;
    let right = right
        .trim()
        .parse()
        .map_err(|_| format!("'{right}' is not a number"))?;
    Ok((left, right))
}
