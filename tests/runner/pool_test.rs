//! Integration tests for the download pool.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ytdlp_driver::parser::ProgressEvent;
use ytdlp_driver::runner::{
    CancelReason, DownloadPool, JobEvent, PoolError, ProcessRunner, RunEvent, RunRequest, RunState,
};
use ytdlp_driver::sink::NullSink;

fn pool(max: usize) -> (DownloadPool, tokio::sync::mpsc::UnboundedReceiver<JobEvent>) {
    DownloadPool::new(ProcessRunner::new(Arc::new(NullSink)), max)
}

fn shell(script: &str) -> RunRequest {
    RunRequest::new("sh", vec!["-c".to_string(), script.to_string()])
}

#[tokio::test]
async fn jobs_complete_and_events_are_tagged() {
    let (mut pool, mut events) = pool(2);
    let a = pool.submit("http://a", shell("echo '[download] Destination: a.mp4'"));
    let b = pool.submit("http://b", shell("echo '[download] Destination: b.mp4'"));
    assert!(pool.has_pending());
    assert_eq!(pool.get_job(a).map(|job| job.url.as_str()), Some("http://a"));

    let results = pool.join_all().await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.as_ref().is_ok_and(|job| job.success())));
    assert_eq!(pool.stats().completed, 2);
    assert_eq!(pool.active_count(), 0);

    drop(pool);
    let mut destinations: HashMap<uuid::Uuid, String> = HashMap::new();
    let mut finished = HashSet::new();
    while let Some(JobEvent { job_id, event }) = events.recv().await {
        match event {
            RunEvent::Progress(ProgressEvent::Destination { path }) => {
                destinations.insert(job_id, path);
            }
            RunEvent::Finished(RunState::Completed) => {
                finished.insert(job_id);
            }
            _ => {}
        }
    }
    assert_eq!(destinations.get(&a).map(String::as_str), Some("a.mp4"));
    assert_eq!(destinations.get(&b).map(String::as_str), Some("b.mp4"));
    assert_eq!(finished, HashSet::from([a, b]));
}

#[tokio::test]
async fn concurrency_is_limited() {
    let (mut pool, _events) = pool(1);
    let started = Instant::now();
    pool.submit("http://a", shell("sleep 0.3"));
    pool.submit("http://b", shell("sleep 0.3"));
    pool.join_all().await;

    assert!(started.elapsed() >= Duration::from_millis(600));
    assert_eq!(pool.stats().completed, 2);
}

#[tokio::test]
async fn jobs_run_in_parallel_up_to_limit() {
    let (mut pool, _events) = pool(3);
    let started = Instant::now();
    for url in ["http://a", "http://b", "http://c"] {
        pool.submit(url, shell("sleep 0.5"));
    }
    pool.join_all().await;

    assert!(started.elapsed() < Duration::from_millis(1400));
}

#[tokio::test]
async fn cancel_one_job() {
    let (mut pool, _events) = pool(2);
    let slow = pool.submit("http://slow", shell("sleep 30"));
    let fast = pool.submit("http://fast", shell("true"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    pool.cancel(slow).unwrap();

    let results = tokio::time::timeout(Duration::from_secs(10), pool.join_all())
        .await
        .expect("cancelled job did not stop");
    for result in results {
        let job = result.unwrap();
        let run = job.result.unwrap();
        if job.id == slow {
            assert_eq!(
                run.state,
                RunState::Cancelled {
                    reason: CancelReason::Requested
                }
            );
        } else {
            assert_eq!(job.id, fast);
            assert!(run.success());
        }
    }

    let stats = pool.stats();
    assert_eq!((stats.completed, stats.cancelled), (1, 1));
}

#[tokio::test]
async fn cancel_all_stops_queued_jobs() {
    let (mut pool, mut events) = pool(1);
    let running = pool.submit("http://a", shell("sleep 30"));
    let queued = pool.submit("http://b", shell("sleep 30"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    pool.cancel_all();

    let results = tokio::time::timeout(Duration::from_secs(10), pool.join_all())
        .await
        .expect("cancel_all did not stop jobs");
    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|r| r.as_ref().is_ok_and(|job| job.result.as_ref().is_ok_and(|run| run.is_cancelled()))));
    assert_eq!(pool.stats().cancelled, 2);

    drop(pool);
    let mut finished = Vec::new();
    while let Some(JobEvent { job_id, event }) = events.recv().await {
        if let RunEvent::Finished(state) = event {
            finished.push((job_id, state));
        }
    }
    assert_eq!(finished.len(), 2);
    assert!(finished.iter().any(|(id, _)| *id == running));
    assert!(finished.iter().any(|(id, _)| *id == queued));
}

#[tokio::test]
async fn cancel_unknown_job_is_error() {
    let (pool, _events) = pool(1);
    let id = uuid::Uuid::new_v4();
    assert!(matches!(
        pool.cancel(id),
        Err(PoolError::JobNotFound { id: missing }) if missing == id
    ));
}

#[tokio::test]
async fn failed_jobs_are_counted() {
    let (mut pool, _events) = pool(2);
    pool.submit("http://a", shell("exit 1"));
    pool.submit(
        "http://b",
        RunRequest::new("/nonexistent/yt-dlp", vec!["http://b".to_string()]),
    );
    let results = pool.join_all().await;

    assert!(results.iter().all(|r| r.as_ref().is_ok_and(|job| !job.success())));
    assert_eq!(pool.stats().failed, 2);
    assert_eq!(pool.stats().total(), 2);
}
