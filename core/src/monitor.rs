use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::converter::TranscodeCommand;
use crate::events::LogCategory;
use crate::progress::{LineSplitter, ProgressParser};
use crate::utils::tail_chars;
use crate::{OrganizerError, Result};

/// Characters of tool output kept for a failure report
pub const DIAGNOSTIC_TAIL_CHARS: usize = 500;
const DIAGNOSTIC_BUFFER_CHARS: usize = 4 * DIAGNOSTIC_TAIL_CHARS;
const READ_CHUNK: usize = 4096;

/// Lifecycle of one transcoder invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    NotStarted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl MonitorState {
    /// Completed, failed or cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MonitorState::Completed | MonitorState::Failed | MonitorState::Cancelled
        )
    }
}

/// How a monitored invocation ended
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutcome {
    Completed,
    Failed {
        exit_code: Option<i32>,
        /// Tail of the tool's diagnostic output
        diagnostic: String,
    },
    Cancelled,
}

/// Live notification from a running job
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorUpdate {
    Progress(f64),
    Log { line: String, category: LogCategory },
}

/// Owns one transcoder process from launch to exit.
///
/// A monitor runs exactly one job; its state only moves forward
/// `NotStarted -> Running -> {Completed, Failed, Cancelled}`.
#[derive(Debug)]
pub struct TranscodeMonitor {
    state: MonitorState,
    parser: ProgressParser,
    diagnostic: String,
}

impl Default for TranscodeMonitor {
    fn default() -> Self {
        Self {
            state: MonitorState::NotStarted,
            parser: ProgressParser::new(),
            diagnostic: String::new(),
        }
    }
}

impl TranscodeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Total media length reported by the tool, 0 while unknown
    pub fn total_duration(&self) -> f64 {
        self.parser.total_duration()
    }

    /// Seconds of media processed so far
    pub fn elapsed(&self) -> f64 {
        self.parser.elapsed()
    }

    /// Launch `command` and follow it until it exits or `cancel` fires.
    ///
    /// Only a launch failure is returned as an error; everything after the
    /// process started is reported through [`MonitorOutcome`]. A cancelled
    /// job's partial output is left on disk.
    pub async fn run<F>(
        &mut self,
        command: &TranscodeCommand,
        cancel: &CancelToken,
        mut on_update: F,
    ) -> Result<MonitorOutcome>
    where
        F: FnMut(MonitorUpdate),
    {
        if self.state != MonitorState::NotStarted {
            return Err(OrganizerError::State(format!(
                "monitor already used (state {:?})",
                self.state
            )));
        }

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| OrganizerError::Launch {
                program: command.program.clone(),
                source,
            })?;
        self.state = MonitorState::Running;
        debug!(pid = ?child.id(), "transcoder started");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, tx.clone())));
        }
        drop(tx);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(self.terminate(&mut child, readers).await);
                }
                line = rx.recv() => match line {
                    Some(line) => self.handle_line(&line, &mut on_update),
                    // Both pipes closed; the process is exiting.
                    None => break,
                },
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(self.terminate(&mut child, readers).await);
            }
            status = child.wait() => status,
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                self.state = MonitorState::Failed;
                return Ok(MonitorOutcome::Failed {
                    exit_code: None,
                    diagnostic: format!("failed to wait for transcoder: {e}"),
                });
            }
        };

        let missing: Vec<_> = command
            .outputs
            .iter()
            .filter(|path| !path.is_file())
            .collect();

        if status.success() && missing.is_empty() {
            self.state = MonitorState::Completed;
            info!("transcoder finished");
            return Ok(MonitorOutcome::Completed);
        }

        self.state = MonitorState::Failed;
        let mut diagnostic = tail_chars(self.diagnostic.trim_end(), DIAGNOSTIC_TAIL_CHARS).to_string();
        if status.success() {
            let names: Vec<_> = missing.iter().map(|p| p.display().to_string()).collect();
            diagnostic = format!(
                "tool reported success but output is missing: {}",
                names.join(", ")
            );
        }
        warn!(code = ?status.code(), "transcoder failed");
        Ok(MonitorOutcome::Failed {
            exit_code: status.code(),
            diagnostic,
        })
    }

    fn handle_line<F>(&mut self, line: &str, on_update: &mut F)
    where
        F: FnMut(MonitorUpdate),
    {
        let outcome = self.parser.feed(line);
        if let Some(fraction) = outcome.progress {
            on_update(MonitorUpdate::Progress(fraction));
        }
        if let Some(category) = outcome.log {
            let line = line.trim().to_string();
            if category != LogCategory::Progress {
                self.remember(&line);
            }
            on_update(MonitorUpdate::Log { line, category });
        }
    }

    fn remember(&mut self, line: &str) {
        self.diagnostic.push_str(line);
        self.diagnostic.push('\n');
        if self.diagnostic.len() > 2 * DIAGNOSTIC_BUFFER_CHARS {
            self.diagnostic = tail_chars(&self.diagnostic, DIAGNOSTIC_BUFFER_CHARS).to_string();
        }
    }

    async fn terminate(&mut self, child: &mut Child, readers: Vec<JoinHandle<()>>) -> MonitorOutcome {
        info!("cancelling transcoder");
        if let Err(e) = child.start_kill() {
            debug!("kill failed, process probably exited: {e}");
        }
        let _ = child.wait().await;
        for reader in readers {
            reader.abort();
        }
        self.state = MonitorState::Cancelled;
        MonitorOutcome::Cancelled
    }
}

async fn forward_lines<R>(mut reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in splitter.push(&buf[..n]) {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                debug!("transcoder output closed: {e}");
                break;
            }
        }
    }
    if let Some(line) = splitter.finish() {
        let _ = tx.send(line);
    }
}
