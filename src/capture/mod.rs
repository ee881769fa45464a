//! # Camera Capture
//!
//! The camera is an external collaborator that pushes frames into the
//! pipeline through a [`FrameSink`]. The sink turns each delivery into a
//! sequence-numbered, timestamped [`Frame`] and hands it to the bounded
//! [`FrameQueue`]; it never blocks the camera.
//!
//! ## Architecture
//!
//! ```text
//! CameraSource ──deliver()──► FrameSink ──stride──► FrameQueue ──► Uploader
//!                               │
//!                               └── sequence, captured_at, stats
//! ```
//!
//! Implementations:
//! - [`SyntheticCamera`]: timer-driven NV21 generator used by the `ppg` binary

pub mod synthetic;

pub use synthetic::SyntheticCamera;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::trace;

use crate::core::{epoch_millis, Frame, FrameImage, FrameQueue, PipelineStats};
use crate::error::PipelineResult;

/// Abstract interface for camera drivers.
///
/// The driver owns its delivery cadence. The pipeline never assumes a fixed
/// frame rate.
#[async_trait]
pub trait CameraSource: Send {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Opens the device. A failure here is reported as
    /// [`PipelineError::CameraUnavailable`](crate::error::PipelineError::CameraUnavailable).
    async fn initialize(&mut self) -> PipelineResult<()>;

    /// Begins delivering frames into `sink` until [`CameraSource::shutdown`].
    async fn start(&mut self, sink: FrameSink) -> PipelineResult<()>;

    /// Stops delivery. No frame reaches the sink after this returns.
    async fn shutdown(&mut self) -> PipelineResult<()>;
}

/// Outcome of one camera delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued without loss.
    Queued,
    /// Queued; an older frame was evicted to make room.
    Evicted,
    /// Not selected by the frame stride.
    Skipped,
    /// The session is stopping; the frame was discarded.
    Closed,
}

#[derive(Debug)]
struct SinkShared {
    queue: Arc<FrameQueue>,
    stats: Arc<PipelineStats>,
    stride: u64,
    delivered: AtomicU64,
    next_sequence: AtomicU64,
    open: AtomicBool,
}

/// Cloneable delivery callback handed to the camera.
#[derive(Debug, Clone)]
pub struct FrameSink {
    shared: Arc<SinkShared>,
}

impl FrameSink {
    /// Sink feeding `queue`, keeping every `stride`-th delivery (at least 1).
    pub fn new(queue: Arc<FrameQueue>, stats: Arc<PipelineStats>, stride: u32) -> Self {
        Self {
            shared: Arc::new(SinkShared {
                queue,
                stats,
                stride: u64::from(stride.max(1)),
                delivered: AtomicU64::new(0),
                next_sequence: AtomicU64::new(1),
                open: AtomicBool::new(true),
            }),
        }
    }

    /// Accepts one camera image. Never blocks.
    pub fn deliver(&self, image: FrameImage) -> Delivery {
        let shared = &self.shared;
        if !shared.open.load(Ordering::Acquire) {
            return Delivery::Closed;
        }

        let nth = shared.delivered.fetch_add(1, Ordering::Relaxed);
        PipelineStats::bump(&shared.stats.frames_delivered);
        if nth % shared.stride != 0 {
            PipelineStats::bump(&shared.stats.frames_skipped);
            return Delivery::Skipped;
        }

        let frame = Frame {
            sequence: shared.next_sequence.fetch_add(1, Ordering::Relaxed),
            captured_at_ms: epoch_millis(SystemTime::now()),
            image,
        };
        let sequence = frame.sequence;

        if shared.queue.enqueue(frame) {
            PipelineStats::bump(&shared.stats.frames_enqueued);
            trace!(sequence, "frame queued");
            Delivery::Queued
        } else if shared.queue.is_closed() {
            Delivery::Closed
        } else {
            PipelineStats::bump(&shared.stats.frames_enqueued);
            PipelineStats::bump(&shared.stats.frames_evicted);
            trace!(sequence, "frame queued, oldest evicted");
            Delivery::Evicted
        }
    }

    /// Rejects every later delivery.
    pub fn close(&self) {
        self.shared.open.store(false, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }
}
