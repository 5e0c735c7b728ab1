//! End-to-end runs of the batch processor against a scripted stand-in for
//! ffmpeg.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use once_cell::sync::Lazy;
use seriesorg_core::{
    AudioMode, AudioTrack, BatchEvent, BatchProcessor, ItemOutcome, LogCategory, NamingScheme,
    OperationMode, RunConfig, RunState, RunSummary, SeriesIdentity, TranscodeSettings, WorkItem,
};
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc;

// Writes every argument under an `/out/` directory, which is where the tests
// put all outputs. Everything is printed on stderr so the order of the lines
// is fixed.
const WRITE_OUTPUTS: &str = r#"for a; do
  case "$a" in */out/*) printf 'fake media' > "$a" ;; esac
done"#;

struct FakeTools {
    _dir: TempDir,
    ok: PathBuf,
    flaky: PathBuf,
    lazy: PathBuf,
    slow: PathBuf,
    echo: PathBuf,
}

// All scripts are written before any test spawns a process, so no child can
// inherit a script's write handle.
static TOOLS: Lazy<FakeTools> = Lazy::new(|| {
    let dir = tempdir().unwrap();
    let ok = script(
        dir.path(),
        "ok",
        &format!(
            r#"echo "Input #0, matroska,webm, from 'input.mkv':" >&2
echo "  Duration: 00:02:30.00, start: 0.000000, bitrate: 1500 kb/s" >&2
printf 'frame=  900 fps=300 q=28.0 size=    5120kB time=00:01:15.00 bitrate=559.2kbits/s speed=25x\r' >&2
echo "out_time=00:02:30.000000" >&2
echo "progress=end" >&2
{WRITE_OUTPUTS}"#
        ),
    );
    let flaky = script(
        dir.path(),
        "flaky",
        &format!(
            r#"case "$*" in *__bad__*) echo "Error while decoding stream #0:0: corrupt input" >&2; exit 1 ;; esac
echo "  Duration: 00:00:10.00, start: 0.000000" >&2
{WRITE_OUTPUTS}"#
        ),
    );
    let lazy = script(dir.path(), "lazy", "echo 'nothing to do' >&2\nexit 0");
    let slow = script(
        dir.path(),
        "slow",
        r#"echo "  Duration: 00:10:00.00, start: 0.000000" >&2
printf 'frame=1 time=00:00:01.00 speed=1x\r' >&2
exec sleep 30"#,
    );
    let echo = script(
        dir.path(),
        "echo",
        &format!(
            r#"echo "called with: $*" >&2
{WRITE_OUTPUTS}"#
        ),
    );
    FakeTools {
        _dir: dir,
        ok,
        flaky,
        lazy,
        slow,
        echo,
    }
});

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("in")).unwrap();
        Self { dir }
    }

    fn items(&self, names: &[&str]) -> Vec<WorkItem> {
        names
            .iter()
            .map(|name| {
                let path = self.dir.path().join("in").join(name);
                fs::write(&path, name.as_bytes()).unwrap();
                WorkItem::local(path)
            })
            .collect()
    }

    fn config(&self, mode: OperationMode, tool: Option<&Path>) -> RunConfig {
        RunConfig {
            mode,
            output_directory: self.dir.path().join("out"),
            tool: tool.map(Path::to_path_buf),
            ..RunConfig::default()
        }
    }
}

fn tracks(languages: &[&str]) -> Vec<AudioTrack> {
    languages
        .iter()
        .enumerate()
        .map(|(index, language)| AudioTrack {
            index,
            codec: "aac".into(),
            language: language.to_string(),
            title: format!("Audio {}", index + 1),
            channels: 2,
            sample_rate: 48000,
        })
        .collect()
}

fn identity() -> SeriesIdentity {
    SeriesIdentity::new("Show")
}

fn drain(rx: &mut mpsc::UnboundedReceiver<BatchEvent>) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn logs(events: &[BatchEvent]) -> Vec<(&str, LogCategory)> {
    events
        .iter()
        .filter_map(|event| match event {
            BatchEvent::Log { message, category } => Some((message.as_str(), *category)),
            _ => None,
        })
        .collect()
}

fn finished_count(events: &[BatchEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, BatchEvent::RunFinished { .. }))
        .count()
}

async fn run(
    processor: &BatchProcessor,
    items: Vec<WorkItem>,
    config: RunConfig,
) -> RunSummary {
    let handle = processor.start_run(items, identity(), config).unwrap();
    tokio::time::timeout(Duration::from_secs(20), handle.wait())
        .await
        .expect("run finished in time")
        .unwrap()
}

#[tokio::test]
async fn convert_reports_half_way_progress() {
    let workspace = Workspace::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let processor = BatchProcessor::new(Arc::new(tx));

    let mut config = workspace.config(OperationMode::Convert, Some(&TOOLS.ok));
    config.structured_layout = true;
    let summary = run(&processor, workspace.items(&["pilot.mkv"]), config).await;

    assert!(summary.succeeded());
    let output = summary.output_root.join("Show - S01E01.mkv");
    assert!(summary.output_root.ends_with("out/Show/Season 01"));
    assert_eq!(fs::read(&output).unwrap(), b"fake media");

    let events = drain(&mut rx);
    let progress: Vec<f64> = events
        .iter()
        .filter_map(|event| match event {
            BatchEvent::ItemProgress { index: 0, fraction } => Some(*fraction),
            _ => None,
        })
        .collect();
    assert_eq!(progress, [0.5, 1.0]);

    let logs = logs(&events);
    assert!(logs
        .iter()
        .any(|(line, category)| line.starts_with("Duration: 00:02:30.00") && *category == LogCategory::Info));
    assert!(!logs.iter().any(|(line, _)| line.starts_with("frame=")));
    assert!(!logs.iter().any(|(line, _)| line.starts_with("progress=")));
    assert!(logs
        .iter()
        .any(|(line, category)| line.starts_with("Done: Show - S01E01.mkv") && *category == LogCategory::Success));
    assert_eq!(finished_count(&events), 1);
}

#[tokio::test]
async fn cancel_between_items_keeps_completed_work() {
    let workspace = Workspace::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let processor_cell: Arc<OnceLock<Arc<BatchProcessor>>> = Arc::new(OnceLock::new());

    let cell = processor_cell.clone();
    let sink = move |event: BatchEvent| {
        if let BatchEvent::ItemFinished { index: 1, .. } = &event {
            if let Some(processor) = cell.get() {
                assert!(processor.request_cancel());
            }
        }
        let _ = tx.send(event);
    };
    let processor = Arc::new(BatchProcessor::new(Arc::new(sink)));
    let _ = processor_cell.set(processor.clone());

    let items = workspace.items(&["e1.mkv", "e2.mkv", "e3.mkv", "e4.mkv", "e5.mkv"]);
    let summary = run(&processor, items, workspace.config(OperationMode::Rename, None)).await;

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 0);
    assert!(summary.cancelled);
    assert!(!summary.succeeded());
    assert_eq!(processor.state(), RunState::Idle);
    assert!(!processor.request_cancel());

    let root = &summary.output_root;
    assert!(root.join("Show - S01E02.mkv").exists());
    assert!(!root.join("Show - S01E03.mkv").exists());

    let events = drain(&mut rx);
    let started = events
        .iter()
        .filter(|event| matches!(event, BatchEvent::ItemStarted { .. }))
        .count();
    assert_eq!(started, 2);
    assert!(matches!(
        events.last(),
        Some(BatchEvent::RunFinished { succeeded: false, summary }) if summary.cancelled
    ));
}

#[tokio::test]
async fn cancel_mid_item_stops_the_tool() {
    let workspace = Workspace::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let processor_cell: Arc<OnceLock<Arc<BatchProcessor>>> = Arc::new(OnceLock::new());

    let cell = processor_cell.clone();
    let sink = move |event: BatchEvent| {
        if let BatchEvent::ItemProgress { .. } = &event {
            if let Some(processor) = cell.get() {
                processor.request_cancel();
            }
        }
        let _ = tx.send(event);
    };
    let processor = Arc::new(BatchProcessor::new(Arc::new(sink)));
    let _ = processor_cell.set(processor.clone());

    let items = workspace.items(&["long.mkv", "next.mkv"]);
    let summary = run(
        &processor,
        items,
        workspace.config(OperationMode::Convert, Some(&TOOLS.slow)),
    )
    .await;

    assert!(summary.cancelled);
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(processor.state(), RunState::Idle);

    let events = drain(&mut rx);
    assert!(events.iter().any(|event| matches!(
        event,
        BatchEvent::ItemFinished { index: 0, outcome: ItemOutcome::Cancelled }
    )));
    assert!(!events
        .iter()
        .any(|event| matches!(event, BatchEvent::ItemStarted { index: 1, .. })));
    assert_eq!(finished_count(&events), 1);
}

#[tokio::test]
async fn convert_without_tool_fails_before_any_event() {
    let workspace = Workspace::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let processor = BatchProcessor::new(Arc::new(tx));

    let err = processor
        .start_run(
            workspace.items(&["a.mkv"]),
            identity(),
            workspace.config(OperationMode::Convert, None),
        )
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(processor.state(), RunState::Idle);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn failed_item_does_not_stop_the_run() {
    let workspace = Workspace::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let processor = BatchProcessor::new(Arc::new(tx));

    let items = workspace.items(&["a__bad__.mkv", "b.mkv"]);
    let summary = run(
        &processor,
        items,
        workspace.config(OperationMode::Convert, Some(&TOOLS.flaky)),
    )
    .await;

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 1);
    assert!(summary.aborted.is_none());
    assert!(summary.output_root.join("Show - S01E02.mkv").exists());

    let events = drain(&mut rx);
    let failure = events.iter().find_map(|event| match event {
        BatchEvent::ItemFinished {
            index: 0,
            outcome: ItemOutcome::Failed { reason },
        } => Some(reason.clone()),
        _ => None,
    });
    let failure = failure.expect("first item failed");
    assert!(failure.contains("exited with 1"));
    assert!(failure.contains("corrupt input"));

    let overall: Vec<usize> = events
        .iter()
        .filter_map(|event| match event {
            BatchEvent::OverallProgress { completed, total: 2 } => Some(*completed),
            _ => None,
        })
        .collect();
    assert_eq!(overall, [1, 2]);
}

#[tokio::test]
async fn success_without_output_is_a_failure() {
    let workspace = Workspace::new();
    let processor = BatchProcessor::new(Arc::new(seriesorg_core::NullSink));

    let summary = run(
        &processor,
        workspace.items(&["a.mkv"]),
        workspace.config(OperationMode::Convert, Some(&TOOLS.lazy)),
    )
    .await;

    assert_eq!(summary.completed, 0);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn missing_tool_aborts_the_run() {
    let workspace = Workspace::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let processor = BatchProcessor::new(Arc::new(tx));
    let missing = workspace.dir.path().join("no-such-ffmpeg");

    let summary = run(
        &processor,
        workspace.items(&["a.mkv", "b.mkv", "c.mkv"]),
        workspace.config(OperationMode::Convert, Some(&missing)),
    )
    .await;

    assert_eq!(summary.completed, 0);
    assert_eq!(summary.failed, 1);
    assert!(summary.aborted.is_some());
    assert!(!summary.cancelled);

    let events = drain(&mut rx);
    let started = events
        .iter()
        .filter(|event| matches!(event, BatchEvent::ItemStarted { .. }))
        .count();
    assert_eq!(started, 1);
    assert!(logs(&events)
        .iter()
        .any(|(line, category)| line.starts_with("Run aborted") && *category == LogCategory::Error));
    assert_eq!(finished_count(&events), 1);
}

#[tokio::test]
async fn remote_episodes_use_compact_names() {
    let workspace = Workspace::new();
    let processor = BatchProcessor::new(Arc::new(seriesorg_core::NullSink));
    let items = vec![
        WorkItem::remote("https://cdn.example.com/show/1/master.m3u8", "Pilot").unwrap(),
        WorkItem::remote("https://cdn.example.com/show/2/master.m3u8", "Second").unwrap(),
    ];
    let mut config = workspace.config(OperationMode::Convert, Some(&TOOLS.ok));
    config.naming = NamingScheme::Compact;

    let summary = run(&processor, items, config).await;

    assert!(summary.succeeded());
    assert!(summary.output_root.join("Show 01x01.mp4").exists());
    assert!(summary.output_root.join("Show 01x02.mp4").exists());
}

#[tokio::test]
async fn extract_all_writes_one_file_per_track() {
    let workspace = Workspace::new();
    let processor = BatchProcessor::new(Arc::new(seriesorg_core::NullSink));
    let mut items = workspace.items(&["dual.mkv"]);
    items[0].audio_tracks = tracks(&["jpn", "eng"]);

    let mut config = workspace.config(OperationMode::ExtractAudio, Some(&TOOLS.ok));
    config.transcode = TranscodeSettings {
        audio_mode: AudioMode::ExtractAll,
        ..TranscodeSettings::default()
    };

    let summary = run(&processor, items, config).await;

    assert!(summary.succeeded());
    let mut produced: Vec<String> = fs::read_dir(&summary.output_root)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    produced.sort();
    assert_eq!(
        produced,
        [
            "Show - S01E01 - Track 1 (jpn).mp3",
            "Show - S01E01 - Track 2 (eng).mp3"
        ]
    );
}

#[tokio::test]
async fn missing_audio_track_falls_back_to_the_first() {
    let workspace = Workspace::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let processor = BatchProcessor::new(Arc::new(tx));
    let mut items = workspace.items(&["dual.mkv"]);
    items[0].audio_tracks = tracks(&["jpn", "eng"]);

    let mut config = workspace.config(OperationMode::Convert, Some(&TOOLS.echo));
    config.transcode = TranscodeSettings {
        audio_mode: AudioMode::SelectTrack(5),
        ..TranscodeSettings::default()
    };

    let summary = run(&processor, items, config).await;

    assert!(summary.succeeded());
    assert_eq!(summary.completed, 1);
    assert!(summary.output_root.join("Show - S01E01.mkv").exists());

    let events = drain(&mut rx);
    let logs = logs(&events);
    assert!(logs.iter().any(|(line, category)| *category == LogCategory::Warning
        && line.contains("audio track 5")
        && line.contains("using track 0")));
    let invocation = logs
        .iter()
        .find_map(|(line, _)| line.strip_prefix("called with: "))
        .expect("tool echoed its arguments");
    assert!(invocation.contains("-map 0:a:0"));
    assert!(!invocation.contains("0:a:5"));
    assert!(events.iter().any(|event| matches!(
        event,
        BatchEvent::ItemFinished {
            outcome: ItemOutcome::Completed { .. },
            ..
        }
    )));
}

#[tokio::test]
async fn second_run_is_rejected_while_running() {
    let workspace = Workspace::new();
    let processor = BatchProcessor::new(Arc::new(seriesorg_core::NullSink));
    let handle = processor
        .start_run(
            workspace.items(&["a.mkv"]),
            identity(),
            workspace.config(OperationMode::Convert, Some(&TOOLS.slow)),
        )
        .unwrap();

    let err = processor
        .start_run(
            workspace.items(&["b.mkv"]),
            identity(),
            workspace.config(OperationMode::Rename, None),
        )
        .unwrap_err();
    assert!(matches!(err, seriesorg_core::OrganizerError::State(_)));

    assert!(processor.request_cancel());
    let summary = tokio::time::timeout(Duration::from_secs(20), handle.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(summary.cancelled);
    assert_eq!(processor.state(), RunState::Idle);
}
