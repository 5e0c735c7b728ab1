use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Category attached to every log line sent to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Error,
    Warning,
    /// Stream and container metadata from the tool, or run milestones
    Info,
    /// Time-bearing status lines from the tool
    Progress,
    Success,
    Generic,
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogCategory::Error => "error",
            LogCategory::Warning => "warning",
            LogCategory::Info => "info",
            LogCategory::Progress => "progress",
            LogCategory::Success => "success",
            LogCategory::Generic => "generic",
        })
    }
}

/// How one item of a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemOutcome {
    Completed { outputs: Vec<PathBuf> },
    Failed { reason: String },
    Cancelled,
}

/// Final accounting of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: bool,
    /// Set when a run-fatal condition stopped the batch
    pub aborted: Option<String>,
    pub output_root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Items that finished, successfully or not
    pub fn processed(&self) -> usize {
        self.completed + self.failed
    }

    /// Every item completed, nothing cancelled or aborted
    pub fn succeeded(&self) -> bool {
        !self.cancelled && self.aborted.is_none() && self.failed == 0 && self.completed == self.total
    }
}

/// Structured notifications emitted by the worker while a run is active.
///
/// Events are emitted from the worker task; a presentation layer that needs
/// them on its own thread should forward them through a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchEvent {
    RunStarted {
        run_id: String,
        total: usize,
        output_root: PathBuf,
    },
    Log {
        message: String,
        category: LogCategory,
    },
    ItemStarted {
        index: usize,
        episode: u32,
        display_name: String,
        output_name: String,
    },
    ItemProgress {
        index: usize,
        fraction: f64,
    },
    ItemFinished {
        index: usize,
        outcome: ItemOutcome,
    },
    OverallProgress {
        completed: usize,
        total: usize,
    },
    RunFinished {
        succeeded: bool,
        summary: RunSummary,
    },
}

/// Receiver of [`BatchEvent`]s
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: BatchEvent);
}

impl<F> EventSink for F
where
    F: Fn(BatchEvent) + Send + Sync + 'static,
{
    fn emit(&self, event: BatchEvent) {
        self(event)
    }
}

impl EventSink for mpsc::UnboundedSender<BatchEvent> {
    fn emit(&self, event: BatchEvent) {
        // A dropped receiver only means nobody is watching any more.
        let _ = self.send(event);
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: BatchEvent) {}
}
