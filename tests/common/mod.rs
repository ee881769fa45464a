//! Common test utilities shared by the integration tests
//!
//! Scripted and hanging transports, hand-driven cameras and a recording
//! chart, so sessions can be exercised without a camera or a backend.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use ppg_link::capture::{CameraSource, Delivery, FrameSink};
use ppg_link::core::{ChartPoint, FrameImage, PixelFormat};
use ppg_link::error::{PipelineError, PipelineResult};
use ppg_link::pipeline::ChartSink;
use ppg_link::transport::{Method, Transport, TransportRequest, TransportResponse};
use ppg_link::PipelineConfig;

/// Configuration tuned for tests: no reset call, no deadline, every frame kept.
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.reset_on_start = false;
    config.capture.frame_stride = 1;
    config.capture.max_duration_ms = None;
    config.poll_interval_ms = 100;
    config.display.refresh_interval_ms = 50;
    config
}

/// Tiny pass-through JPEG so uploads skip real encoding.
pub fn jpeg_image() -> FrameImage {
    FrameImage::new(PixelFormat::Jpeg, 2, 2, vec![0xFF, 0xD8, 0xFF, 0xD9])
}

/// Polls `cond` every 5 ms (virtual time under `start_paused`), panicking
/// after 10 s.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..2_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

fn is_reset(request: &TransportRequest) -> bool {
    request.url.ends_with("/reset")
}

fn is_upload(request: &TransportRequest) -> bool {
    request.method == Method::Post && request.url.ends_with("/frames")
}

fn upload_sequence(request: &TransportRequest) -> Option<u64> {
    request.body.as_ref()?.get("sequence")?.as_u64()
}

/// One scripted poll answer.
#[derive(Debug, Clone)]
pub enum PollReply {
    Json(serde_json::Value),
    /// Body sent verbatim, for answers `serde_json::Value` cannot hold.
    Raw(&'static str),
    Status(u16),
    NetworkError,
}

/// Transport answering from a script and recording every request.
#[derive(Default)]
pub struct ScriptedTransport {
    upload_failures: Mutex<HashMap<u64, (u32, u16)>>,
    reset_status: Mutex<Option<u16>>,
    polls: Mutex<VecDeque<PollReply>>,
    log: Mutex<Vec<(Instant, TransportRequest)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The first `times` uploads of `sequence` answer with `status`.
    pub fn fail_upload(&self, sequence: u64, times: u32, status: u16) {
        self.upload_failures
            .lock()
            .unwrap()
            .insert(sequence, (times, status));
    }

    pub fn fail_reset(&self, status: u16) {
        *self.reset_status.lock().unwrap() = Some(status);
    }

    pub fn push_poll(&self, reply: PollReply) {
        self.polls.lock().unwrap().push_back(reply);
    }

    pub fn push_samples(&self, samples: &[(i64, f64)]) {
        let samples: Vec<serde_json::Value> = samples
            .iter()
            .map(|&(key, value)| serde_json::json!({ "key": key, "value": value }))
            .collect();
        self.push_poll(PollReply::Json(serde_json::json!({ "samples": samples })));
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.log.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    /// Times at which `sequence` was attempted.
    pub fn upload_times(&self, sequence: u64) -> Vec<Instant> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| is_upload(r) && upload_sequence(r) == Some(sequence))
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn upload_attempts(&self, sequence: u64) -> usize {
        self.upload_times(sequence).len()
    }

    pub fn poll_requests(&self) -> Vec<TransportRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == Method::Get)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn exchange(&self, request: TransportRequest) -> PipelineResult<TransportResponse> {
        self.log
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));

        if is_reset(&request) {
            let status = self.reset_status.lock().unwrap().unwrap_or(200);
            return Ok(TransportResponse::new(status, "{}"));
        }

        if is_upload(&request) {
            let sequence = upload_sequence(&request).unwrap_or_default();
            let mut failures = self.upload_failures.lock().unwrap();
            if let Some((remaining, status)) = failures.get_mut(&sequence) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Ok(TransportResponse::new(*status, "scripted failure"));
                }
            }
            return Ok(TransportResponse::new(200, "{}"));
        }

        let reply = self.polls.lock().unwrap().pop_front();
        match reply {
            Some(PollReply::Json(body)) => Ok(TransportResponse::new(200, body.to_string())),
            Some(PollReply::Raw(body)) => Ok(TransportResponse::new(200, body)),
            Some(PollReply::Status(status)) => Ok(TransportResponse::new(status, "scripted")),
            Some(PollReply::NetworkError) => Err(PipelineError::transient_network(
                "scripted",
                "connection reset",
            )),
            None => Ok(TransportResponse::new(200, r#"{"samples":[]}"#)),
        }
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Transport whose uploads and polls never complete. Active exchanges are
/// counted and uncounted when their future is dropped.
#[derive(Default)]
pub struct HangingTransport {
    pub active_uploads: Arc<AtomicUsize>,
    pub active_polls: Arc<AtomicUsize>,
    pub uploads_started: AtomicUsize,
    first_poll: Mutex<Option<serde_json::Value>>,
}

impl HangingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer the first poll with `body`, then hang like every other request.
    pub fn with_first_poll(body: serde_json::Value) -> Arc<Self> {
        let transport = Self::default();
        *transport.first_poll.lock().unwrap() = Some(body);
        Arc::new(transport)
    }

    pub fn active(&self) -> usize {
        self.active_uploads.load(Ordering::SeqCst) + self.active_polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for HangingTransport {
    async fn exchange(&self, request: TransportRequest) -> PipelineResult<TransportResponse> {
        if is_reset(&request) {
            return Ok(TransportResponse::new(200, "{}"));
        }
        let _guard = if request.method == Method::Get {
            let first = self.first_poll.lock().unwrap().take();
            if let Some(body) = first {
                return Ok(TransportResponse::new(200, body.to_string()));
            }
            ActiveGuard::enter(&self.active_polls)
        } else {
            self.uploads_started.fetch_add(1, Ordering::SeqCst);
            ActiveGuard::enter(&self.active_uploads)
        };
        std::future::pending().await
    }
}

/// Camera driven by hand through a [`CameraRemote`].
pub struct ManualCamera {
    sink: Arc<Mutex<Option<FrameSink>>>,
    shutdowns: Arc<AtomicUsize>,
}

/// Test-side control of a [`ManualCamera`].
#[derive(Clone)]
pub struct CameraRemote {
    sink: Arc<Mutex<Option<FrameSink>>>,
    pub shutdowns: Arc<AtomicUsize>,
}

impl ManualCamera {
    pub fn new() -> (Self, CameraRemote) {
        let sink = Arc::new(Mutex::new(None));
        let shutdowns = Arc::new(AtomicUsize::new(0));
        (
            Self {
                sink: sink.clone(),
                shutdowns: shutdowns.clone(),
            },
            CameraRemote { sink, shutdowns },
        )
    }
}

impl CameraRemote {
    /// Delivers `count` frames as the camera callback would.
    pub fn deliver(&self, count: usize) -> Vec<Delivery> {
        let sink = self.sink.lock().unwrap().clone();
        let sink = sink.expect("camera not started");
        (0..count).map(|_| sink.deliver(jpeg_image())).collect()
    }

    pub fn deliver_image(&self, image: FrameImage) -> Delivery {
        let sink = self.sink.lock().unwrap().clone();
        sink.expect("camera not started").deliver(image)
    }
}

#[async_trait]
impl CameraSource for ManualCamera {
    fn name(&self) -> &str {
        "manual"
    }

    async fn initialize(&mut self) -> PipelineResult<()> {
        Ok(())
    }

    async fn start(&mut self, sink: FrameSink) -> PipelineResult<()> {
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn shutdown(&mut self) -> PipelineResult<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Where a [`BrokenCamera`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokenAt {
    Initialize,
    Start,
}

/// Camera that cannot be opened or cannot start streaming.
pub struct BrokenCamera {
    pub at: BrokenAt,
    pub shutdowns: Arc<AtomicUsize>,
}

impl BrokenCamera {
    pub fn new(at: BrokenAt) -> Self {
        Self {
            at,
            shutdowns: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl CameraSource for BrokenCamera {
    fn name(&self) -> &str {
        "broken"
    }

    async fn initialize(&mut self) -> PipelineResult<()> {
        match self.at {
            BrokenAt::Initialize => Err(PipelineError::camera_unavailable(
                "broken",
                "permission denied",
            )),
            BrokenAt::Start => Ok(()),
        }
    }

    async fn start(&mut self, _sink: FrameSink) -> PipelineResult<()> {
        Err(PipelineError::state("opened", "start", "device busy"))
    }

    async fn shutdown(&mut self) -> PipelineResult<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Chart keeping every rendered window.
#[derive(Clone, Default)]
pub struct RecordingChart {
    pub renders: Arc<Mutex<Vec<Vec<ChartPoint>>>>,
}

impl RecordingChart {
    pub fn render_count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Vec<ChartPoint>> {
        self.renders.lock().unwrap().last().cloned()
    }
}

impl ChartSink for RecordingChart {
    fn render(&mut self, points: &[ChartPoint]) {
        self.renders.lock().unwrap().push(points.to_vec());
    }
}
