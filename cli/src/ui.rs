use colored::*;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use seriesorg_core::{BatchEvent, LogCategory, RunSummary, WorkItem};

const ITEM_SCALE: u64 = 1000;

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏ ")
}

/// Terminal view of a running batch: one bar for the run, one for the
/// current item, log lines printed above them.
pub struct RunView {
    multi: MultiProgress,
    overall: ProgressBar,
    item: ProgressBar,
    verbose: bool,
}

impl RunView {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(0));
        overall.set_style(bar_style(
            "{prefix:.bold} [{bar:40.green/grey}] {pos}/{len} {msg}",
        ));
        overall.set_prefix("Total");
        let item = multi.add(ProgressBar::new(ITEM_SCALE));
        item.set_style(bar_style(
            "{prefix:.bold} [{bar:40.cyan/grey}] {percent:>3}% {wide_msg}",
        ));
        item.set_prefix("Item ");

        Self {
            multi,
            overall,
            item,
            verbose,
        }
    }

    pub fn handle(&self, event: BatchEvent) {
        match event {
            BatchEvent::RunStarted { total, output_root, .. } => {
                self.overall.set_length(total as u64);
                self.overall.set_position(0);
                self.println(format!("📁 Output: {}", output_root.display()));
            }
            BatchEvent::Log { message, category } => {
                if self.verbose || !matches!(category, LogCategory::Progress | LogCategory::Generic) {
                    self.println(format_log(&message, category));
                }
            }
            BatchEvent::ItemStarted {
                episode,
                output_name,
                ..
            } => {
                self.item.set_position(0);
                self.item.set_message(format!("E{episode:02} {output_name}"));
            }
            BatchEvent::ItemProgress { fraction, .. } => {
                self.item
                    .set_position((fraction.clamp(0.0, 1.0) * ITEM_SCALE as f64) as u64);
            }
            BatchEvent::ItemFinished { .. } => {}
            BatchEvent::OverallProgress { completed, total } => {
                self.overall.set_length(total as u64);
                self.overall.set_position(completed as u64);
            }
            BatchEvent::RunFinished { .. } => {
                self.item.finish_and_clear();
                self.overall.finish_and_clear();
            }
        }
    }

    pub fn println(&self, line: String) {
        if self.multi.println(&line).is_err() {
            eprintln!("{line}");
        }
    }
}

pub fn format_log(message: &str, category: LogCategory) -> String {
    match category {
        LogCategory::Error => format!("❌ {}", message.red()),
        LogCategory::Warning => format!("⚠️  {}", message.yellow()),
        LogCategory::Success => format!("✅ {}", message.green()),
        LogCategory::Info => message.cyan().to_string(),
        LogCategory::Progress | LogCategory::Generic => message.dimmed().to_string(),
    }
}

/// Numbered item listing used by `scan` and dry runs
pub fn display_items(items: &[WorkItem], names: &[String], show_tracks: bool) {
    if items.is_empty() {
        println!("{}", "No video files found".yellow());
        return;
    }
    println!("{}", "🎬 Episodes".cyan().bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for (position, (item, name)) in items.iter().zip(names).enumerate() {
        let size = item.size_hint.as_deref().unwrap_or("-");
        println!(
            "{:>3}. {} {} {}",
            position + 1,
            item.display_name,
            "→".dimmed(),
            name.green()
        );
        println!("     {} {}", "size:".dimmed(), size);
        if show_tracks {
            for track in &item.audio_tracks {
                println!(
                    "     {} #{} {} {} ({} ch, {} Hz) {}",
                    "audio:".dimmed(),
                    track.index,
                    track.language.yellow(),
                    track.codec,
                    track.channels,
                    track.sample_rate,
                    track.title
                );
            }
        }
    }
}

pub fn display_summary(summary: &RunSummary) {
    let elapsed = (summary.finished_at - summary.started_at).num_seconds().max(0) as u64;
    println!();
    println!("📊 Run Summary:");
    println!("   ✅ Completed: {}", summary.completed.to_string().green());
    println!("   ❌ Failed: {}", summary.failed.to_string().red());
    if summary.cancelled {
        println!("   🚫 {}", "Cancelled".yellow());
    }
    if let Some(reason) = &summary.aborted {
        println!("   🛑 Aborted: {}", reason.red());
    }
    println!(
        "   ⏱️  Time: {}",
        seriesorg_core::format_duration(elapsed)
    );
    println!("   📁 Output: {}", summary.output_root.display());
}
