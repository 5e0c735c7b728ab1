use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::converter::{build_command, TranscodeRequest};
use crate::events::{BatchEvent, EventSink, ItemOutcome, LogCategory, RunSummary};
use crate::layout::{ensure_output_dir, SeriesIdentity};
use crate::monitor::{MonitorOutcome, MonitorUpdate, TranscodeMonitor};
use crate::numbering::{check_numbering, episode_number, NamingScheme};
use crate::quality::{OperationMode, TranscodeSettings};
use crate::registry::{ItemSource, WorkItem};
use crate::utils::format_bytes;
use crate::{OrganizerError, Result};

/// Extension given to outputs whose source carries none (remote streams)
pub const REMOTE_OUTPUT_EXTENSION: &str = ".mp4";

/// Output settings of one run, fully resolved by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunConfig {
    pub mode: OperationMode,
    pub output_directory: PathBuf,
    /// Nest output as `Series (Year) [id]/Season NN`
    pub structured_layout: bool,
    pub naming: NamingScheme,
    pub transcode: TranscodeSettings,
    /// Transcoder executable, required by `Convert` and `ExtractAudio`
    pub tool: Option<PathBuf>,
}

/// Whether a batch is currently being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
}

/// Output file name of the item at `position`
pub fn planned_file_name(
    item: &WorkItem,
    position: usize,
    identity: &SeriesIdentity,
    config: &RunConfig,
) -> String {
    let extension = match config.mode {
        OperationMode::ExtractAudio => format!(".{}", config.transcode.audio_format.extension()),
        _ => item
            .source
            .extension()
            .unwrap_or_else(|| REMOTE_OUTPUT_EXTENSION.to_string()),
    };
    config.naming.file_name(
        &identity.file_stem_name(),
        identity.season,
        episode_number(identity.start_episode, position),
        &extension,
    )
}

/// Runs batches on a background task, one at a time.
///
/// All progress is reported through the [`EventSink`] given at construction.
/// The sink is called from the worker task.
pub struct BatchProcessor {
    sink: Arc<dyn EventSink>,
    running: Arc<AtomicBool>,
    cancel: Mutex<Option<Arc<CancelToken>>>,
}

impl BatchProcessor {
    /// Create an idle processor reporting to `sink`
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            running: Arc::new(AtomicBool::new(false)),
            cancel: Mutex::new(None),
        }
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        if self.running.load(Ordering::SeqCst) {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    /// True while a run is in progress
    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Validate, prepare the output directory and start processing `items`
    /// on a new tokio task.
    ///
    /// Every precondition failure is returned here, before any event is
    /// emitted. Must be called from within a tokio runtime.
    pub fn start_run(
        &self,
        items: Vec<WorkItem>,
        identity: SeriesIdentity,
        config: RunConfig,
    ) -> Result<RunHandle> {
        if self.is_running() {
            return Err(OrganizerError::State("a run is already in progress".into()));
        }
        validate_run(&items, &identity, &config)?;
        let output_root = ensure_output_dir(
            &config.output_directory,
            &identity,
            config.structured_layout,
        )?;

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(OrganizerError::State("a run is already in progress".into()));
        }

        let token = Arc::new(CancelToken::new());
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());

        let run_id = Uuid::new_v4().to_string();
        let worker = RunWorker {
            run_id: run_id.clone(),
            sink: self.sink.clone(),
            token,
            items,
            identity,
            config,
            output_root: output_root.clone(),
        };
        let guard = RunningGuard(self.running.clone());
        let span = info_span!("batch_run", run_id = %run_id);
        let handle = tokio::spawn(worker.run(guard).instrument(span));

        Ok(RunHandle {
            run_id,
            output_root,
            handle,
        })
    }

    /// Ask the active run to stop at its next checkpoint.
    ///
    /// Idempotent. Returns `true` if a running batch received the request.
    pub fn request_cancel(&self) -> bool {
        let guard = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(token) if self.is_running() => {
                if token.cancel() {
                    info!("cancellation requested");
                }
                true
            }
            _ => false,
        }
    }
}

fn validate_run(items: &[WorkItem], identity: &SeriesIdentity, config: &RunConfig) -> Result<()> {
    if items.is_empty() {
        return Err(OrganizerError::Validation("no items to process".into()));
    }
    identity.validate()?;
    check_numbering(identity.start_episode, items.len())?;
    if config.output_directory.as_os_str().is_empty() {
        return Err(OrganizerError::Validation("output directory is empty".into()));
    }
    if config.mode.needs_transcoder() && config.tool.is_none() {
        return Err(OrganizerError::Validation(format!(
            "{} mode needs ffmpeg, which was not found",
            config.mode
        )));
    }
    if config.mode == OperationMode::Rename {
        if let Some(item) = items.iter().find(|item| item.source.is_remote()) {
            return Err(OrganizerError::Validation(format!(
                "remote item '{}' cannot be renamed; use convert mode",
                item.display_name
            )));
        }
    }
    Ok(())
}

/// Resets the running flag, also when the worker panics
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle on a started run
#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    output_root: PathBuf,
    handle: JoinHandle<RunSummary>,
}

impl RunHandle {
    /// Identifier shared by this run's tracing span and summary
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Directory every output of this run is written to
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run to end
    pub async fn wait(self) -> Result<RunSummary> {
        self.handle
            .await
            .map_err(|e| OrganizerError::State(format!("run worker stopped abnormally: {e}")))
    }
}

struct RunWorker {
    run_id: String,
    sink: Arc<dyn EventSink>,
    token: Arc<CancelToken>,
    items: Vec<WorkItem>,
    identity: SeriesIdentity,
    config: RunConfig,
    output_root: PathBuf,
}

impl RunWorker {
    async fn run(self, guard: RunningGuard) -> RunSummary {
        let started_at = Utc::now();
        let total = self.items.len();
        let mut completed = 0;
        let mut failed = 0;
        let mut cancelled = false;
        let mut aborted = None;

        self.sink.emit(BatchEvent::RunStarted {
            run_id: self.run_id.clone(),
            total,
            output_root: self.output_root.clone(),
        });
        self.log(
            format!(
                "Starting {} of {} items into {}",
                self.config.mode,
                total,
                self.output_root.display()
            ),
            LogCategory::Info,
        );

        for (index, item) in self.items.iter().enumerate() {
            if self.token.is_cancelled() {
                cancelled = true;
                break;
            }

            let file_name = planned_file_name(item, index, &self.identity, &self.config);
            let output = self.output_root.join(&file_name);
            self.sink.emit(BatchEvent::ItemStarted {
                index,
                episode: episode_number(self.identity.start_episode, index),
                display_name: item.display_name.clone(),
                output_name: file_name.clone(),
            });
            self.log(
                format!("[{}/{}] {} -> {}", index + 1, total, item.display_name, file_name),
                LogCategory::Info,
            );

            let outcome = match self.config.mode {
                OperationMode::Rename => self.copy_item(index, item, &output).await,
                _ => match self.transcode_item(index, item, &output).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        // The tool cannot start, so no later item can succeed either.
                        let reason = e.to_string();
                        self.log(format!("Run aborted: {reason}"), LogCategory::Error);
                        aborted = Some(reason.clone());
                        ItemOutcome::Failed { reason }
                    }
                },
            };

            match &outcome {
                ItemOutcome::Completed { outputs } => {
                    completed += 1;
                    self.log(
                        format!("Done: {} ({})", file_name, format_bytes(total_size(outputs))),
                        LogCategory::Success,
                    );
                }
                ItemOutcome::Failed { reason } => {
                    failed += 1;
                    if aborted.is_none() {
                        self.log(
                            format!("Failed: {}: {}", item.display_name, reason),
                            LogCategory::Error,
                        );
                    }
                }
                ItemOutcome::Cancelled => {
                    cancelled = true;
                    self.log(
                        format!("Cancelled: {} (partial output kept)", item.display_name),
                        LogCategory::Warning,
                    );
                }
            }

            let stop = matches!(outcome, ItemOutcome::Cancelled) || aborted.is_some();
            self.sink.emit(BatchEvent::ItemFinished { index, outcome });
            if !cancelled {
                self.sink.emit(BatchEvent::OverallProgress {
                    completed: completed + failed,
                    total,
                });
            }
            if stop {
                break;
            }
        }

        let summary = RunSummary {
            run_id: self.run_id.clone(),
            total,
            completed,
            failed,
            cancelled,
            aborted,
            output_root: self.output_root.clone(),
            started_at,
            finished_at: Utc::now(),
        };

        let message = format!(
            "Processed {} of {} items ({} failed) into {}",
            summary.processed(),
            total,
            failed,
            self.output_root.display()
        );
        let category = if summary.succeeded() {
            LogCategory::Success
        } else if cancelled {
            LogCategory::Warning
        } else if summary.aborted.is_some() || failed > 0 {
            LogCategory::Error
        } else {
            LogCategory::Info
        };
        if cancelled {
            self.log("Run cancelled".to_string(), LogCategory::Warning);
        }
        self.log(message, category);

        drop(guard);
        self.sink.emit(BatchEvent::RunFinished {
            succeeded: summary.succeeded(),
            summary: summary.clone(),
        });
        summary
    }

    async fn copy_item(&self, index: usize, item: &WorkItem, output: &Path) -> ItemOutcome {
        let ItemSource::Local(source) = &item.source else {
            return ItemOutcome::Failed {
                reason: "remote items cannot be copied".into(),
            };
        };
        self.sink.emit(BatchEvent::ItemProgress {
            index,
            fraction: 0.0,
        });
        match tokio::fs::copy(source, output).await {
            Ok(bytes) => {
                debug!(index, bytes, "copied {}", source.display());
                self.sink.emit(BatchEvent::ItemProgress {
                    index,
                    fraction: 1.0,
                });
                ItemOutcome::Completed {
                    outputs: vec![output.to_path_buf()],
                }
            }
            Err(e) => ItemOutcome::Failed {
                reason: format!("copy to {} failed: {e}", output.display()),
            },
        }
    }

    /// Errors only for launch failures; everything else is an item outcome
    async fn transcode_item(
        &self,
        index: usize,
        item: &WorkItem,
        output: &Path,
    ) -> Result<ItemOutcome> {
        let Some(tool) = self.config.tool.as_deref() else {
            return Err(OrganizerError::Validation("no transcoder configured".into()));
        };
        let request = TranscodeRequest {
            mode: self.config.mode,
            settings: &self.config.transcode,
            source: &item.source,
            audio_tracks: &item.audio_tracks,
            output,
        };
        let Some(command) = build_command(tool, &request) else {
            return Ok(ItemOutcome::Failed {
                reason: format!("{} mode has no transcoder command", self.config.mode),
            });
        };
        for warning in &command.warnings {
            self.log(warning.clone(), LogCategory::Warning);
        }
        debug!(index, command = %command.command_line(), "launching transcoder");

        let mut monitor = TranscodeMonitor::new();
        let outcome = monitor
            .run(&command, &self.token, |update| match update {
                MonitorUpdate::Progress(fraction) => {
                    self.sink.emit(BatchEvent::ItemProgress { index, fraction })
                }
                MonitorUpdate::Log { line, category } => self.log(line, category),
            })
            .await?;

        Ok(match outcome {
            MonitorOutcome::Completed => ItemOutcome::Completed {
                outputs: command.outputs,
            },
            MonitorOutcome::Failed {
                exit_code,
                diagnostic,
            } => {
                let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                ItemOutcome::Failed {
                    reason: format!("transcoder exited with {code}: {diagnostic}"),
                }
            }
            MonitorOutcome::Cancelled => ItemOutcome::Cancelled,
        })
    }

    fn log(&self, message: String, category: LogCategory) {
        match category {
            LogCategory::Error => error!("{message}"),
            LogCategory::Warning => warn!("{message}"),
            LogCategory::Info | LogCategory::Success => info!("{message}"),
            LogCategory::Progress | LogCategory::Generic => debug!("{message}"),
        }
        self.sink.emit(BatchEvent::Log { message, category });
    }
}

fn total_size(outputs: &[PathBuf]) -> u64 {
    outputs
        .iter()
        .filter_map(|path| std::fs::metadata(path).ok())
        .map(|metadata| metadata.len())
        .sum()
}
