//! Integration tests for single download runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use ytdlp_driver::command::{CommandBuilder, CommandError};
use ytdlp_driver::parser::{InfoLevel, ProgressEvent};
use ytdlp_driver::runner::{
    CancelReason, OutputStream, ProcessRunner, RunError, RunEvent, RunRequest, RunResult,
    RunState, SpawnError,
};
use ytdlp_driver::sink::NullSink;

fn runner() -> ProcessRunner {
    ProcessRunner::new(Arc::new(NullSink))
}

fn shell(script: &str) -> RunRequest {
    RunRequest::new("sh", vec!["-c".to_string(), script.to_string()])
}

/// Run to completion and collect every event.
async fn run_collect(request: RunRequest) -> (Result<RunResult, RunError>, Vec<RunEvent>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = runner().run(request, CancellationToken::new(), tx).await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (result, events)
}

fn progress(events: &[RunEvent]) -> Vec<&ProgressEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            RunEvent::Progress(progress) => Some(progress),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn successful_run_streams_classified_events() {
    let script = "echo '[youtube] Extracting URL: http://x'; \
                  echo '[download] Destination: f.mp4'; \
                  echo '[download]  45.0% of 10MiB at 1MiB/s ETA 00:05'; \
                  echo '[download] 100% of 10MiB at 2MiB/s ETA 00:00'";
    let (result, events) = run_collect(shell(script)).await;
    let result = result.unwrap();

    assert!(result.success());
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stats.stdout_lines, 4);
    assert_eq!(result.stats.errors, 0);

    let kinds: Vec<&str> = progress(&events).iter().map(|e| e.kind_name()).collect();
    assert_eq!(
        kinds,
        [
            "url_extracted",
            "destination",
            "download_progress",
            "download_complete"
        ]
    );
    assert_eq!(events.last(), Some(&RunEvent::Finished(RunState::Completed)));
}

#[tokio::test]
async fn raw_line_precedes_its_classification() {
    let (_, events) = run_collect(shell("echo '[download] Destination: f.mp4'")).await;
    assert_eq!(
        events[0],
        RunEvent::Raw {
            stream: OutputStream::Stdout,
            line: "[download] Destination: f.mp4".to_string(),
        }
    );
    assert_eq!(
        events[1],
        RunEvent::Progress(ProgressEvent::Destination {
            path: "f.mp4".to_string(),
        })
    );
}

#[tokio::test]
async fn nonzero_exit_carries_stderr() {
    let script = "echo '[youtube] Extracting URL: http://x'; \
                  echo 'ERROR: [youtube] x: Video unavailable' >&2; \
                  exit 3";
    let (result, events) = run_collect(shell(script)).await;
    let result = result.unwrap();

    assert!(!result.success());
    assert_eq!(result.exit_code, Some(3));
    match &result.state {
        RunState::Failed { exit_code, stderr } => {
            assert_eq!(*exit_code, Some(3));
            assert!(stderr.contains("Video unavailable"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(result.stderr_tail.contains("ERROR: [youtube] x: Video unavailable"));
    assert_eq!(result.stats.errors, 1);

    assert!(progress(&events).contains(&&ProgressEvent::Error {
        message: "[youtube] x: Video unavailable".to_string(),
    }));
    assert!(matches!(
        events.last(),
        Some(RunEvent::Finished(RunState::Failed { .. }))
    ));
}

#[tokio::test]
async fn stderr_errors_do_not_stop_stdout() {
    let script = "echo 'ERROR: first problem' >&2; \
                  echo '[download] Destination: f.mp4'; \
                  echo 'ERROR: second problem' >&2; \
                  echo '[download] 100% of 1MiB'";
    let (result, events) = run_collect(shell(script)).await;
    let result = result.unwrap();

    assert!(result.success());
    assert_eq!(result.stats.errors, 2);
    assert_eq!(result.stats.stderr_lines, 2);
    assert!(progress(&events).iter().any(|e| e.is_complete()));
}

#[tokio::test]
async fn stderr_warning_is_not_an_error() {
    let (result, events) = run_collect(shell("echo 'WARNING: slow connection' >&2")).await;
    let result = result.unwrap();

    assert!(result.success());
    assert_eq!(result.stats.errors, 0);
    assert!(progress(&events).contains(&&ProgressEvent::UnclassifiedInfo {
        raw: "WARNING: slow connection".to_string(),
        level: InfoLevel::Warning,
    }));
}

#[tokio::test]
async fn stderr_tail_is_bounded() {
    let script = "i=0; while [ $i -lt 50 ]; do echo \"line $i\" >&2; i=$((i+1)); done; exit 1";
    let (result, _) = run_collect(shell(script)).await;
    let result = result.unwrap();

    let lines: Vec<&str> = result.stderr_tail.lines().collect();
    assert_eq!(lines.len(), ytdlp_driver::runner::STDERR_TAIL_LINES);
    assert_eq!(lines.last(), Some(&"line 49"));
    assert!(!result.stderr_tail.contains("line 0\n"));
}

#[tokio::test]
async fn invalid_utf8_is_replaced() {
    let (result, events) = run_collect(shell(r"printf 'caf\351 [download]\n'")).await;
    assert!(result.unwrap().success());

    let raw = events.iter().find_map(|event| match event {
        RunEvent::Raw { line, .. } => Some(line.clone()),
        _ => None,
    });
    assert_eq!(raw.as_deref(), Some("caf\u{FFFD} [download]"));
}

#[tokio::test]
async fn missing_executable_emits_nothing() {
    let request = RunRequest::new("/nonexistent/yt-dlp", vec!["http://x".to_string()]);
    let (result, events) = run_collect(request).await;

    assert!(matches!(result, Err(RunError::Spawn(SpawnError::NotFound))));
    assert!(events.is_empty());
}

#[tokio::test]
async fn output_dir_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested").join("videos");

    let (result, _) = run_collect(shell("true").output_dir(&out)).await;
    assert!(result.unwrap().success());
    assert!(out.is_dir());
}

#[tokio::test]
async fn output_dir_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, "x").unwrap();

    let (result, events) = run_collect(shell("true").output_dir(file.join("sub"))).await;
    assert!(matches!(result, Err(RunError::OutputDir { .. })));
    assert!(events.is_empty());
}

#[tokio::test]
async fn working_dir_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let (result, events) = run_collect(shell("pwd").working_dir(dir.path())).await;
    assert!(result.unwrap().success());

    let printed = events.iter().find_map(|event| match event {
        RunEvent::Raw { line, .. } => Some(line.clone()),
        _ => None,
    });
    assert_eq!(
        std::fs::canonicalize(printed.unwrap()).unwrap(),
        std::fs::canonicalize(dir.path()).unwrap()
    );
}

#[tokio::test]
async fn rejections_surface_before_output() {
    let request = shell("echo '[download] Destination: f.mp4'").rejections(vec![
        CommandError::InvalidOption {
            flag: "--exec".to_string(),
        },
    ]);
    let (result, events) = run_collect(request).await;
    let result = result.unwrap();

    assert!(result.success());
    assert_eq!(result.stats.errors, 1);
    assert_eq!(
        events[0],
        RunEvent::Progress(ProgressEvent::Error {
            message: "Invalid option: --exec".to_string(),
        })
    );
}

#[test]
fn request_from_builder_drains_builder() {
    let mut builder = CommandBuilder::new(Arc::new(NullSink))
        .format("b")
        .unwrap()
        .add_custom_flag("--not-a-real-flag-xyz");
    let request = RunRequest::from_builder("yt-dlp", &mut builder, "http://x").unwrap();

    assert!(builder.rejections().is_empty());
    assert_eq!(request.args().last().map(String::as_str), Some("http://x"));
    assert!(!request.args().iter().any(|a| a == "--not-a-real-flag-xyz"));
    assert!(request.command_line().starts_with("yt-dlp -f b"));
}

#[tokio::test]
async fn cancel_kills_running_download() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let request = shell("echo started; sleep 30; echo never");

    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move { runner().run(request, cancel, tx).await }
    });

    // Wait until the process is producing output.
    loop {
        match rx.recv().await {
            Some(RunEvent::Raw { .. }) => break,
            Some(_) => {}
            None => panic!("run ended before producing output"),
        }
    }
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("cancel did not stop the run")
        .unwrap()
        .unwrap();
    assert!(result.is_cancelled());
    assert_eq!(
        result.state,
        RunState::Cancelled {
            reason: CancelReason::Requested
        }
    );

    let mut rest = Vec::new();
    while let Some(event) = rx.recv().await {
        rest.push(event);
    }
    assert!(!rest.iter().any(|e| matches!(e, RunEvent::Raw { line, .. } if line == "never")));
    assert!(matches!(
        rest.last(),
        Some(RunEvent::Finished(RunState::Cancelled { .. }))
    ));
}

#[tokio::test]
async fn timeout_ends_run_as_cancelled() {
    let request = shell("sleep 30").timeout(Duration::from_millis(200));
    let started = std::time::Instant::now();
    let (result, events) = run_collect(request).await;
    let result = result.unwrap();

    assert_eq!(
        result.state,
        RunState::Cancelled {
            reason: CancelReason::TimedOut
        }
    );
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn pre_cancelled_token_stops_run_immediately() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = runner().run(shell("sleep 30"), cancel, tx).await.unwrap();
    assert!(result.is_cancelled());
}

#[tokio::test]
async fn pre_cancelled_run_spawns_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("never-created");
    let request = RunRequest::new("/nonexistent/yt-dlp", vec!["http://x".to_string()])
        .output_dir(&out);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = runner().run(request, cancel, tx).await.unwrap();
    assert_eq!(
        result.state,
        RunState::Cancelled {
            reason: CancelReason::Requested
        }
    );
    assert_eq!(result.exit_code, None);
    assert!(!out.exists());

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events, [RunEvent::Finished(result.state.clone())]);
}

#[tokio::test]
async fn blank_lines_reach_the_raw_transcript() {
    let (result, events) = run_collect(shell(r"printf 'a\n\nb\n'; printf '\n' >&2")).await;
    let result = result.unwrap();
    assert!(result.success());

    let stdout: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            RunEvent::Raw {
                stream: OutputStream::Stdout,
                line,
            } => Some(line.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(stdout, ["a", "", "b"]);
    assert!(events.contains(&RunEvent::Raw {
        stream: OutputStream::Stderr,
        line: String::new(),
    }));

    // Blank lines are transcribed but not classified.
    assert_eq!(progress(&events).len(), 2);
    assert_eq!(result.stats.errors, 0);
    assert!(result.stderr_tail.is_empty());
}

#[tokio::test]
async fn dropped_receiver_does_not_stop_run() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);

    let result = runner()
        .run(shell("echo one; echo two"), CancellationToken::new(), tx)
        .await
        .unwrap();
    assert!(result.success());
    assert_eq!(result.stats.stdout_lines, 2);
}
