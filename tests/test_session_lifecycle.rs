//! Integration tests for session start-up and teardown
//!
//! These tests verify that a session refuses to start without a usable
//! camera, resets the backend on start, ends on its measurement deadline or
//! on request, and that stopping leaves no request running.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{
    test_config, wait_until, BrokenAt, BrokenCamera, HangingTransport, ManualCamera,
    ScriptedTransport,
};
use ppg_link::capture::Delivery;
use ppg_link::core::lock_signal;
use ppg_link::error::classify;
use ppg_link::transport::Method;
use ppg_link::{SessionBuilder, StopReason};

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_uploads_and_pending_poll() {
    let transport = HangingTransport::with_first_poll(serde_json::json!({
        "samples": [{ "key": 1, "value": 0.1 }, { "key": 2, "value": 0.2 }]
    }));
    let (camera, remote) = ManualCamera::new();

    let session = SessionBuilder::new()
        .with_config(test_config())
        .with_camera(camera)
        .with_transport(transport.clone())
        .start()
        .await
        .unwrap();

    wait_until("first poll merged", || session.stats().polls_ok == 1).await;
    remote.deliver(2);
    wait_until("two uploads and a poll pending", || {
        transport.active_uploads.load(Ordering::SeqCst) == 2
            && transport.active_polls.load(Ordering::SeqCst) == 1
    })
    .await;

    let before: Vec<_> = lock_signal(session.signal()).iter().copied().collect();
    let signal = session.signal().clone();

    let summary = session.stop().await;

    assert_eq!(transport.active(), 0);
    assert_eq!(transport.uploads_started.load(Ordering::SeqCst), 2);
    let after: Vec<_> = lock_signal(&signal).iter().copied().collect();
    assert_eq!(before, after);
    assert_eq!(summary.samples_retained, 2);
    assert_eq!(summary.stats.uploads_ok, 0);
    assert_eq!(summary.stats.frames_dropped_upload, 0);
    assert_eq!(summary.stats.polls_failed, 0);
    assert_eq!(remote.shutdowns.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_frames_after_stop_are_discarded() {
    let transport = ScriptedTransport::new();
    let (camera, remote) = ManualCamera::new();

    let session = SessionBuilder::new()
        .with_config(test_config())
        .with_camera(camera)
        .with_transport(transport.clone())
        .start()
        .await
        .unwrap();
    session.stop().await;

    assert_eq!(remote.deliver(1), vec![Delivery::Closed]);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(transport.requests().iter().all(|r| r.method == Method::Get));
}

#[tokio::test]
async fn test_unavailable_camera_fails_start() {
    let transport = ScriptedTransport::new();
    let mut config = test_config();
    config.reset_on_start = true;

    let err = SessionBuilder::new()
        .with_config(config)
        .with_camera(BrokenCamera::new(BrokenAt::Initialize))
        .with_transport(transport.clone())
        .start()
        .await
        .err()
        .unwrap();

    assert_eq!(err.category(), "camera_unavailable");
    assert!(classify::is_fatal(&err));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_camera_that_cannot_stream_fails_start() {
    let transport = ScriptedTransport::new();
    let camera = BrokenCamera::new(BrokenAt::Start);
    let shutdowns = camera.shutdowns.clone();

    let err = SessionBuilder::new()
        .with_config(test_config())
        .with_camera(camera)
        .with_transport(transport)
        .start()
        .await
        .err()
        .unwrap();

    assert_eq!(err.category(), "camera_unavailable");
    assert!(err.to_string().contains("device busy"));
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_backend_reset_precedes_traffic() {
    let transport = ScriptedTransport::new();
    let mut config = test_config();
    config.reset_on_start = true;
    let (camera, remote) = ManualCamera::new();

    let session = SessionBuilder::new()
        .with_config(config)
        .with_session_id("s-42")
        .with_camera(camera)
        .with_transport(transport.clone())
        .start()
        .await
        .unwrap();
    remote.deliver(1);
    wait_until("upload", || session.stats().uploads_ok == 1).await;
    session.stop().await;

    let first = &transport.requests()[0];
    assert_eq!(first.method, Method::Post);
    assert!(first.url.ends_with("/sessions/s-42/reset"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_reset_does_not_prevent_start() {
    let transport = ScriptedTransport::new();
    transport.fail_reset(500);
    let mut config = test_config();
    config.reset_on_start = true;
    let (camera, remote) = ManualCamera::new();

    let session = SessionBuilder::new()
        .with_config(config)
        .with_camera(camera)
        .with_transport(transport.clone())
        .start()
        .await
        .unwrap();
    remote.deliver(1);
    wait_until("upload", || session.stats().uploads_ok == 1).await;
    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_session_ends_after_max_duration() {
    let mut config = test_config();
    config.capture.max_duration_ms = Some(40_000);
    let (camera, _remote) = ManualCamera::new();

    let session = SessionBuilder::new()
        .with_config(config)
        .with_camera(camera)
        .with_transport(ScriptedTransport::new())
        .start()
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    assert_eq!(session.wait().await, StopReason::DurationElapsed);
    assert!(started.elapsed() >= Duration::from_secs(39));
    let summary = session.stop().await;
    assert!(summary.duration >= Duration::from_secs(40));
}

#[tokio::test(start_paused = true)]
async fn test_stop_token_ends_wait_early() {
    let mut config = test_config();
    config.capture.max_duration_ms = Some(40_000);
    let (camera, _remote) = ManualCamera::new();

    let session = SessionBuilder::new()
        .with_config(config)
        .with_camera(camera)
        .with_transport(ScriptedTransport::new())
        .start()
        .await
        .unwrap();

    let stop = session.stop_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        stop.cancel();
    });
    assert_eq!(session.wait().await, StopReason::Cancelled);
    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_cancels_stages() {
    let transport = HangingTransport::new();
    let (camera, remote) = ManualCamera::new();

    let session = SessionBuilder::new()
        .with_config(test_config())
        .with_camera(camera)
        .with_transport(transport.clone())
        .start()
        .await
        .unwrap();
    remote.deliver(1);
    wait_until("upload pending", || transport.active_uploads.load(Ordering::SeqCst) == 1).await;

    drop(session);
    wait_until("stages unwound", || transport.active() == 0).await;
}
