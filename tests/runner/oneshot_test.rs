//! Integration tests for metadata and format queries, against a fake
//! downloader script.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use ytdlp_driver::command::CommandError;
use ytdlp_driver::runner::{CancelReason, Oneshot, OneshotError};

const FAKE_DOWNLOADER: &str = r#"#!/bin/sh
for last; do :; done
case "$1" in
    --dump-single-json)
        printf '{"id": "abc123", "title": "%s", "duration": 61, "formats": [{"format_id": "18", "vcodec": "avc1", "acodec": "mp4a"}]}\n' "$last"
        ;;
    -F)
        echo "[info] Available formats for abc123:"
        echo "ID  EXT   RESOLUTION FPS CH |   FILESIZE   TBR PROTO | VCODEC        VBR ACODEC      ABR ASR MORE INFO"
        echo "----------------------------------------------------------------------------------------------------"
        echo "140 m4a   audio only      2 |    3.30MiB  129k https | audio only        mp4a.40.2  129k 44k medium"
        echo "18  mp4   640x360     25  2 |    9.83MiB  444k https | avc1.42001E  444k mp4a.40.2    0k 44k 360p"
        ;;
esac
"#;

/// Write an executable script named `name` into `dir`.
fn install_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn install_fake(dir: &Path) -> PathBuf {
    install_script(dir, "yt-dlp", FAKE_DOWNLOADER)
}

#[tokio::test]
async fn fetch_metadata_parses_document() {
    let dir = tempfile::tempdir().unwrap();
    let oneshot = Oneshot::new(install_fake(dir.path()));

    let meta = oneshot
        .fetch_metadata("http://x/watch", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(meta.id, "abc123");
    assert_eq!(meta.title, "http://x/watch");
    assert_eq!(meta.duration(), Some(Duration::from_secs(61)));
    assert_eq!(meta.formats.len(), 1);
}

#[tokio::test]
async fn list_formats_parses_table() {
    let dir = tempfile::tempdir().unwrap();
    let oneshot = Oneshot::new(install_fake(dir.path()));

    let rows = oneshot
        .list_formats("http://x", &CancellationToken::new())
        .await
        .unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r.format_id.as_str()).collect();
    assert_eq!(ids, ["140", "18"]);
    assert!(rows[0].is_audio_only());
    assert_eq!(rows[1].resolution, "640x360");
}

#[tokio::test]
async fn nonzero_exit_reports_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let script = install_script(
        dir.path(),
        "failing",
        "#!/bin/sh\necho 'ERROR: [generic] Unsupported URL: http://x' >&2\nexit 1\n",
    );

    let result = Oneshot::new(&script)
        .fetch_metadata("http://x", &CancellationToken::new())
        .await;
    match result {
        Err(OneshotError::Exited { exit_code, stderr }) => {
            assert_eq!(exit_code, Some(1));
            assert_eq!(stderr, "ERROR: [generic] Unsupported URL: http://x");
        }
        other => panic!("expected exit failure, got {other:?}"),
    }
}

#[tokio::test]
async fn unparseable_metadata_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let script = install_script(dir.path(), "noisy", "#!/bin/sh\necho 'not json at all'\n");

    let result = Oneshot::new(&script)
        .fetch_metadata("http://x", &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(OneshotError::Parse(_))));
}

#[tokio::test]
async fn timeout_kills_query() {
    let dir = tempfile::tempdir().unwrap();
    let script = install_script(dir.path(), "slow", "#!/bin/sh\nsleep 30\n");

    let started = std::time::Instant::now();
    let result = Oneshot::new(&script)
        .timeout(Duration::from_millis(200))
        .list_formats("http://x", &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(OneshotError::Cancelled(CancelReason::TimedOut))
    ));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn cancelled_query() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = Oneshot::new(install_fake(dir.path()))
        .list_formats("http://x", &cancel)
        .await;
    assert!(matches!(
        result,
        Err(OneshotError::Cancelled(CancelReason::Requested))
    ));
}

#[tokio::test]
async fn empty_url_is_rejected_before_spawn() {
    let result = Oneshot::new("/nonexistent/yt-dlp")
        .fetch_metadata("  ", &CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(OneshotError::Command(CommandError::EmptyUrl))
    ));
}
