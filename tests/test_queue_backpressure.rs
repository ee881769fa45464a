//! Integration tests for capture-side backpressure
//!
//! A stalled backend must never block frame delivery; the queue keeps only
//! the newest frames.

mod common;

use std::sync::atomic::Ordering;

use common::{jpeg_image, test_config, wait_until, HangingTransport, ManualCamera};
use ppg_link::capture::Delivery;
use ppg_link::core::{epoch_millis, Frame, FrameQueue};
use ppg_link::SessionBuilder;

fn frame(sequence: u64) -> Frame {
    Frame {
        sequence,
        captured_at_ms: epoch_millis(std::time::SystemTime::now()),
        image: jpeg_image(),
    }
}

#[test]
fn test_queue_keeps_newest_frames() {
    let queue = FrameQueue::new(3);
    let accepted: Vec<bool> = (1..=5).map(|s| queue.enqueue(frame(s))).collect();
    assert_eq!(accepted, vec![true, true, true, false, false]);
    assert_eq!(queue.sequences(), vec![3, 4, 5]);
    assert_eq!(queue.evicted(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_backend_does_not_block_camera() {
    let transport = HangingTransport::new();
    let mut config = test_config();
    config.max_in_flight = 1;
    config.queue_capacity = 3;
    let (camera, remote) = ManualCamera::new();

    let session = SessionBuilder::new()
        .with_config(config)
        .with_camera(camera)
        .with_transport(transport.clone())
        .start()
        .await
        .unwrap();

    remote.deliver(1);
    wait_until("slot taken", || transport.active_uploads.load(Ordering::SeqCst) == 1).await;

    let outcomes = remote.deliver(100);
    assert_eq!(outcomes.len(), 100);
    assert!(outcomes[..3].iter().all(|d| *d == Delivery::Queued));
    assert!(outcomes[3..].iter().all(|d| *d == Delivery::Evicted));

    let stats = session.stats();
    assert_eq!(stats.frames_delivered, 101);
    assert_eq!(stats.frames_evicted, 97);

    let summary = session.stop().await;
    assert_eq!(summary.frames_discarded_at_stop, 3);
    assert_eq!(transport.active(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stride_halves_uploaded_frames() {
    let transport = HangingTransport::new();
    let mut config = test_config();
    config.capture.frame_stride = 2;
    config.queue_capacity = 16;
    config.max_in_flight = 1;
    let (camera, remote) = ManualCamera::new();

    let session = SessionBuilder::new()
        .with_config(config)
        .with_camera(camera)
        .with_transport(transport.clone())
        .start()
        .await
        .unwrap();

    remote.deliver(10);
    let stats = session.stats();
    assert_eq!(stats.frames_delivered, 10);
    assert_eq!(stats.frames_skipped, 5);
    assert_eq!(stats.frames_enqueued, 5);
    session.stop().await;
}
