//! Timer-driven camera producing NV21 frames with a pulsing luma plane.

use std::f64::consts::TAU;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{CameraSource, Delivery, FrameSink};
use crate::core::{FrameImage, PixelFormat};
use crate::error::{PipelineError, PipelineResult};

/// Simulated fingertip-on-lens camera.
///
/// Luma oscillates around mid-grey at `pulse_hz`, which is enough for a
/// backend to find a pulse in the stream.
#[derive(Debug)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    fps: u32,
    pulse_hz: f64,
    cancel: CancellationToken,
    task: Option<JoinHandle<u64>>,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            pulse_hz: 1.2,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Pulse frequency in Hz (1.2 Hz is 72 bpm).
    pub fn with_pulse_hz(mut self, pulse_hz: f64) -> Self {
        self.pulse_hz = pulse_hz;
        self
    }

    fn frame_at(width: u32, height: u32, luma: u8) -> FrameImage {
        let y_len = width as usize * height as usize;
        let mut data = vec![128u8; ppg_encode::convert::nv21_len(width, height)];
        data[..y_len].fill(luma);
        FrameImage::new(PixelFormat::Nv21, width, height, data)
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new(320, 240, 30)
    }
}

#[async_trait]
impl CameraSource for SyntheticCamera {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn initialize(&mut self) -> PipelineResult<()> {
        if self.fps == 0 {
            return Err(PipelineError::camera_unavailable(self.name(), "frame rate is zero"));
        }
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(PipelineError::camera_unavailable(
                self.name(),
                format!("NV21 needs even, non-zero dimensions, got {}x{}", self.width, self.height),
            ));
        }
        Ok(())
    }

    async fn start(&mut self, sink: FrameSink) -> PipelineResult<()> {
        if self.task.is_some() {
            return Err(PipelineError::state("streaming", "start", "camera already started"));
        }
        let (width, height, fps, pulse_hz) = (self.width, self.height, self.fps, self.pulse_hz);
        let cancel = self.cancel.clone();
        info!(width, height, fps, "synthetic camera started");

        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs_f64(1.0 / f64::from(fps)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut produced = 0u64;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let t = produced as f64 / f64::from(fps);
                let luma = (128.0 + 24.0 * (TAU * pulse_hz * t).sin()).round() as u8;
                produced += 1;
                if sink.deliver(Self::frame_at(width, height, luma)) == Delivery::Closed {
                    break;
                }
            }
            produced
        }));
        Ok(())
    }

    async fn shutdown(&mut self) -> PipelineResult<()> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(produced) => debug!(produced, "synthetic camera stopped"),
                Err(e) => debug!(error = %e, "synthetic camera task ended abnormally"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FrameQueue, PipelineStats};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_rejects_odd_dimensions() {
        let mut camera = SyntheticCamera::new(321, 240, 30);
        let err = camera.initialize().await.unwrap_err();
        assert_eq!(err.category(), "camera_unavailable");
    }

    #[tokio::test]
    async fn test_rejects_zero_fps() {
        let mut camera = SyntheticCamera::new(320, 240, 0);
        assert!(camera.initialize().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_until_shutdown() {
        let queue = Arc::new(FrameQueue::new(64));
        let stats = Arc::new(PipelineStats::default());
        let sink = FrameSink::new(queue.clone(), stats.clone(), 1);

        let mut camera = SyntheticCamera::new(4, 4, 10);
        camera.initialize().await.unwrap();
        camera.start(sink).await.unwrap();
        tokio::time::sleep(Duration::from_millis(450)).await;
        camera.shutdown().await.unwrap();

        let delivered = stats.snapshot().frames_delivered;
        assert!(delivered >= 4, "delivered {delivered}");
        let frame = queue.dequeue().unwrap();
        assert_eq!(frame.image.format, PixelFormat::Nv21);
        assert_eq!(frame.image.data.len(), 4 * 4 * 3 / 2);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(stats.snapshot().frames_delivered, delivered);
    }

    #[tokio::test]
    async fn test_start_twice_is_a_state_error() {
        let queue = Arc::new(FrameQueue::new(4));
        let stats = Arc::new(PipelineStats::default());
        let sink = FrameSink::new(queue, stats, 1);
        let mut camera = SyntheticCamera::new(4, 4, 10);
        camera.start(sink.clone()).await.unwrap();
        assert!(camera.start(sink).await.is_err());
        camera.shutdown().await.unwrap();
    }
}
