mod args;
mod config;
mod ui;

use anyhow::{bail, Context, Result};
use args::{Cli, Commands, IdentityArgs};
use clap::Parser;
use colored::*;
use crate::config::Settings;
use seriesorg_core::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Scan(args) => {
            scan_folder(args).await?;
        }

        Commands::Organize(args) => {
            organize_folder(args, cli.output, cli.verbose).await?;
        }

        Commands::Series(args) => {
            download_series(args, cli.output, cli.verbose).await?;
        }

        Commands::Config(args) => {
            handle_config(args)?;
        }
    }

    Ok(())
}

type Events = mpsc::UnboundedReceiver<BatchEvent>;

/// Organizer wired to a channel; events are drained on this task while a run is active
fn create_organizer(settings: &Settings) -> (SeriesOrganizer, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    let tool = settings
        .ffmpeg_path
        .clone()
        .or_else(|| SystemToolLocator::ffmpeg().locate());
    (SeriesOrganizer::new(Arc::new(tx), FixedToolLocator(tool)), rx)
}

fn series_identity(args: &IdentityArgs, folder: &Path) -> Result<SeriesIdentity> {
    let name = match &args.name {
        Some(name) => name.clone(),
        None => std::fs::canonicalize(folder)
            .ok()
            .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .context("Cannot derive a series name from the folder; pass --name")?,
    };
    let identity = SeriesIdentity {
        name,
        year: args.year.clone(),
        external_id: args.id.clone(),
        season: args.season,
        start_episode: args.start,
    };
    identity.validate()?;
    Ok(identity)
}

fn output_root(flag: Option<PathBuf>, settings: &Settings) -> Result<PathBuf> {
    match flag.or_else(|| settings.output_directory.clone()) {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().context("Failed to read the current directory"),
    }
}

async fn scan_folder(args: args::ScanArgs) -> Result<()> {
    let settings = Settings::load()?;
    let (mut organizer, _events) = create_organizer(&settings);
    organizer.set_identity(series_identity(&args.identity, &args.folder)?)?;
    organizer
        .detect(&args.folder)
        .with_context(|| format!("Failed to scan {}", args.folder.display()))?;

    if args.guess_start {
        report_guess(organizer.guess_start_episode()?);
    }
    if args.tracks && organizer.probe_audio().await? == 0 {
        warn!("no audio tracks discovered (is ffprobe installed?)");
    }

    let names = organizer.planned_names(&RunConfig::default());
    match args.format.as_str() {
        "json" => {
            let entries: Vec<_> = organizer
                .items()
                .iter()
                .zip(&names)
                .enumerate()
                .map(|(index, (item, name))| {
                    serde_json::json!({
                        "position": index + 1,
                        "episode": organizer.episode_number(index),
                        "output_name": name,
                        "item": item,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            ui::display_items(organizer.items(), &names, args.tracks);
        }
    }

    Ok(())
}

async fn organize_folder(args: args::OrganizeArgs, output: Option<PathBuf>, verbose: bool) -> Result<()> {
    println!("{}", "🎬 Organizing episodes...".cyan().bold());

    let settings = Settings::load()?;
    let (mut organizer, mut events) = create_organizer(&settings);
    organizer.set_identity(series_identity(&args.identity, &args.folder)?)?;
    let found = organizer
        .detect(&args.folder)
        .with_context(|| format!("Failed to scan {}", args.folder.display()))?
        .len();
    println!("🔍 Found {} video files", found.to_string().yellow());

    // Removals refer to the detected order, so drop from the back.
    let mut removals = args.remove.clone();
    removals.sort_unstable_by(|a, b| b.cmp(a));
    removals.dedup();
    for position in removals {
        let removed = match position.checked_sub(1) {
            Some(index) => organizer.remove(index)?,
            None => None,
        };
        match removed {
            Some(item) => println!("🗑️  Removed {}", item.display_name),
            None => bail!("Cannot remove item {position}: out of range"),
        }
    }

    for (from, to) in &args.moves {
        let moved = match from.checked_sub(1) {
            Some(index) => organizer.move_to_position(index, *to)?,
            None => false,
        };
        if !moved {
            bail!("Cannot move item {from} to position {to}");
        }
    }

    if args.guess_start {
        report_guess(organizer.guess_start_episode()?);
    }

    if let Some((position, episode)) = args.episode {
        let index = position
            .checked_sub(1)
            .context("Positions start at 1")?;
        let episode = u32::try_from(episode).context("Episode number is too large")?;
        organizer.update_episode_number(index, episode)?;
    }

    if organizer.items().is_empty() {
        bail!("No video files to process in {}", args.folder.display());
    }

    let transcode = TranscodeSettings {
        resolution: args.resolution.unwrap_or(settings.resolution),
        compression: args.compression.unwrap_or(settings.compression),
        audio_mode: args.audio,
        audio_format: args
            .audio_format
            .clone()
            .unwrap_or_else(|| settings.audio_format.clone()),
    };
    let config = RunConfig {
        mode: args.mode,
        output_directory: output_root(output, &settings)?,
        structured_layout: !args.flat && settings.structured_layout,
        naming: NamingScheme::Standard,
        transcode,
        tool: None,
    };

    let wants_tracks = matches!(args.audio, AudioMode::SelectTrack(_) | AudioMode::ExtractAll);
    if args.mode.needs_transcoder() && wants_tracks {
        organizer.probe_audio().await?;
    }

    if args.dry_run {
        let names = organizer.planned_names(&config);
        ui::display_items(organizer.items(), &names, wants_tracks);
        let target = resolve_output_dir(
            &config.output_directory,
            organizer.identity(),
            config.structured_layout,
        );
        println!("📁 Would write to: {}", target.display());
        return Ok(());
    }

    println!(
        "🎯 Mode: {} | Resolution: {} | Compression: {} | Audio: {}",
        config.mode, config.transcode.resolution, config.transcode.compression, config.transcode.audio_mode
    );
    let summary = run_batch(&organizer, &mut events, config, verbose).await?;
    finish(&summary)
}

async fn download_series(args: args::SeriesArgs, output: Option<PathBuf>, verbose: bool) -> Result<()> {
    println!("{}", "📺 Preparing series download...".cyan().bold());

    let settings = Settings::load()?;
    let (mut organizer, mut events) = create_organizer(&settings);
    let identity = SeriesIdentity {
        season: args.season,
        start_episode: args.start,
        ..SeriesIdentity::new(args.name.clone())
    };
    identity.validate()?;
    organizer.set_identity(identity)?;

    if let Some(list) = &args.list {
        let count = organizer
            .load_episode_list(list)
            .with_context(|| format!("Failed to load episode list {}", list.display()))?;
        println!("📋 Loaded {} episodes from {}", count, list.display());
    }
    for url in &args.urls {
        organizer
            .add_remote_episode(url, None)
            .with_context(|| format!("Rejected episode URL {url}"))?;
    }
    if organizer.items().is_empty() {
        bail!("No episodes given; use --list or --url");
    }

    if let Some(path) = &args.save {
        let count = organizer
            .save_episode_list(path)
            .with_context(|| format!("Failed to save episode list {}", path.display()))?;
        println!("💾 Saved {} episodes to {}", count, path.display());
        return Ok(());
    }

    let config = RunConfig {
        mode: OperationMode::Convert,
        output_directory: output_root(output, &settings)?,
        structured_layout: false,
        naming: NamingScheme::Compact,
        transcode: TranscodeSettings {
            resolution: args.resolution.unwrap_or(settings.resolution),
            compression: args.compression.unwrap_or(settings.compression),
            ..TranscodeSettings::default()
        },
        tool: None,
    };
    let summary = run_batch(&organizer, &mut events, config, verbose).await?;
    finish(&summary)
}

/// Start a run and render its events until it finishes.
///
/// The first Ctrl+C asks the run to stop, the second exits at once.
async fn run_batch(
    organizer: &SeriesOrganizer,
    events: &mut Events,
    config: RunConfig,
    verbose: bool,
) -> Result<RunSummary> {
    let handle = organizer.start(config)?;
    let view = ui::RunView::new(verbose);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    let finished = matches!(event, BatchEvent::RunFinished { .. });
                    view.handle(event);
                    if finished {
                        break;
                    }
                }
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                if interrupted {
                    eprintln!("{}", "Interrupted".red());
                    std::process::exit(130);
                }
                interrupted = true;
                organizer.cancel();
                view.println(format!(
                    "{}",
                    "🚫 Cancelling after the current step... press Ctrl+C again to quit".yellow()
                ));
            }
        }
    }

    Ok(handle.wait().await?)
}

fn finish(summary: &RunSummary) -> Result<()> {
    ui::display_summary(summary);
    if let Some(reason) = &summary.aborted {
        bail!("Run aborted: {reason}");
    }
    if summary.succeeded() {
        println!("🎉 {}", "All episodes processed!".green().bold());
    }
    Ok(())
}

fn report_guess(guess: Option<u32>) {
    match guess {
        Some(start) => println!("🔢 Numbering from episode {}", start.to_string().yellow()),
        None => warn!("no episode number found in the first file name"),
    }
}

fn handle_config(args: args::ConfigArgs) -> Result<()> {
    match args.action {
        args::ConfigAction::Show => {
            config::show_config()?;
        }
        args::ConfigAction::Set { key, value } => {
            config::set_config(&key, &value)?;
        }
        args::ConfigAction::Reset => {
            config::reset_config()?;
        }
        args::ConfigAction::Path => {
            config::show_config_path()?;
        }
    }
    Ok(())
}

fn setup_logging(verbose: bool) {
    // Run progress is rendered from events, so plain runs only surface warnings.
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}
