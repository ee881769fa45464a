//! # Session Management
//!
//! One session is one continuous capture-to-display run. [`SessionBuilder`]
//! wires a camera, a transport and a chart into the pipeline and starts it;
//! the returned [`SessionHandle`] observes it and tears it down.
//!
//! ## Architecture
//!
//! 1. **SessionState**: id, start time and the acknowledgement cursor, shared
//!    by the uploader and the poller
//! 2. **SessionBuilder**: fluent configuration, validated at `start()`
//! 3. **SessionHandle**: status channel, live snapshots, ordered `stop()`
//!
//! ## Teardown Order
//!
//! `stop()` always proceeds in this order:
//! 1. camera shutdown, frame sink closed
//! 2. frame queue closed and drained
//! 3. uploads cancelled; every upload task awaited
//! 4. poller cancelled and awaited (an in-flight poll is dropped)
//! 5. display stopped after one final render
//!
//! The signal buffer is left intact and returned in the summary. No network
//! exchange started by the session outlives `stop()`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ppg_link::capture::SyntheticCamera;
//! use ppg_link::config::PipelineConfig;
//! use ppg_link::session::SessionBuilder;
//!
//! # async fn run() -> ppg_link::error::PipelineResult<()> {
//! let session = SessionBuilder::new()
//!     .with_config(PipelineConfig::default())
//!     .with_camera(SyntheticCamera::default())
//!     .start()
//!     .await?;
//! session.wait().await;
//! let summary = session.stop().await;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::capture::{CameraSource, FrameSink};
use crate::config::PipelineConfig;
use crate::core::{
    lock_signal, ChartPoint, FrameQueue, PipelineStats, SampleKey, SharedSignal, SignalBuffer,
    StatsSnapshot,
};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{
    ChartSink, DisplaySink, EventSender, LogChart, PipelineEvent, ResultPoller, SignalMerger,
    Uploader, VitalSigns,
};
use crate::transport::{HttpTransport, Transport, TransportRequest};
use crate::wire::reset_url;

/// Identity and acknowledgement cursor of one session.
#[derive(Debug)]
pub struct SessionState {
    id: String,
    started_at: SystemTime,
    cursor: Mutex<Option<SampleKey>>,
}

impl SessionState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            started_at: SystemTime::now(),
            cursor: Mutex::new(None),
        }
    }

    /// Session with a fresh random id.
    pub fn generate() -> Self {
        Self::new(format!("{:016x}", rand::rng().random::<u64>()))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Last acknowledged sample key, `None` before the first sample.
    pub fn cursor(&self) -> Option<SampleKey> {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves the cursor forward to `key`. The cursor never moves backwards;
    /// returns its value after the update.
    pub fn advance_cursor(&self, key: SampleKey) -> SampleKey {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let advanced = cursor.map_or(key, |current| current.max(key));
        *cursor = Some(advanced);
        advanced
    }
}

/// Why [`SessionHandle::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    DurationElapsed,
    Cancelled,
}

/// What a finished session leaves behind.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub duration: Duration,
    pub stats: StatsSnapshot,
    pub final_window: Vec<ChartPoint>,
    pub samples_retained: usize,
    pub frames_discarded_at_stop: usize,
    pub vitals: VitalSigns,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "Session {} ran {:.1}s", self.session_id, self.duration.as_secs_f64())?;
        writeln!(
            f,
            "  frames: {} delivered, {} enqueued, {} evicted, {} discarded at stop",
            s.frames_delivered, s.frames_enqueued, s.frames_evicted, self.frames_discarded_at_stop
        )?;
        writeln!(
            f,
            "  uploads: {} ok, {} retries, {} dropped",
            s.uploads_ok, s.upload_retries, s.frames_dropped_upload
        )?;
        writeln!(
            f,
            "  polls: {} ok, {} failed; {} samples merged, {} retained",
            s.polls_ok, s.polls_failed, s.samples_merged, self.samples_retained
        )?;
        match &self.vitals.heart_rate {
            Some(hr) => writeln!(f, "  heart rate: {:.0} bpm", hr.bpm)?,
            None => writeln!(f, "  heart rate: n/a")?,
        }
        match &self.vitals.blood_pressure {
            Some(bp) => write!(
                f,
                "  blood pressure: {:.0}/{:.0} mmHg{}",
                bp.systolic,
                bp.diastolic,
                bp.category
                    .as_deref()
                    .map(|c| format!(" ({c})"))
                    .unwrap_or_default()
            ),
            None => write!(f, "  blood pressure: n/a"),
        }
    }
}

/// Fluent session configuration.
#[derive(Default)]
pub struct SessionBuilder {
    config: PipelineConfig,
    session_id: Option<String>,
    camera: Option<Box<dyn CameraSource>>,
    transport: Option<Arc<dyn Transport>>,
    chart: Option<Box<dyn ChartSink>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Fixed session id instead of a random one.
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_camera<C: CameraSource + 'static>(mut self, camera: C) -> Self {
        self.camera = Some(Box::new(camera));
        self
    }

    /// Transport to use instead of the default HTTP client.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Chart to render into instead of the log.
    pub fn with_chart<C: ChartSink + 'static>(mut self, chart: C) -> Self {
        self.chart = Some(Box::new(chart));
        self
    }

    /// Validates the configuration, opens the camera, resets the backend
    /// session and starts every stage.
    ///
    /// Fails with [`PipelineError::CameraUnavailable`] when the camera cannot
    /// be opened or started; nothing is left running in that case.
    pub async fn start(self) -> PipelineResult<SessionHandle> {
        let Self {
            config,
            session_id,
            camera,
            transport,
            chart,
        } = self;
        config.validate()?;

        let mut camera = camera
            .ok_or_else(|| PipelineError::state("configuring", "start", "no camera configured"))?;
        let transport: Arc<dyn Transport> = match transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(config.request_timeout())?),
        };
        let state = Arc::new(match session_id {
            Some(id) => SessionState::new(id),
            None => SessionState::generate(),
        });

        camera
            .initialize()
            .await
            .map_err(|e| as_camera_error(camera.name(), e))?;

        if config.reset_on_start {
            reset_backend(transport.as_ref(), &config.backend.base_url, state.id()).await;
        }

        let stats = Arc::new(PipelineStats::default());
        let queue = Arc::new(FrameQueue::new(config.queue_capacity));
        let sink = FrameSink::new(queue.clone(), stats.clone(), config.capture.frame_stride);
        let (events, status_rx) = EventSender::channel(config.status_channel_capacity);
        let signal = SignalBuffer::shared(config.retention.clone());
        let merger = Arc::new(SignalMerger::new(signal.clone(), events.clone(), stats.clone()));

        if let Err(e) = camera.start(sink.clone()).await {
            sink.close();
            if let Err(shutdown) = camera.shutdown().await {
                warn!(error = %shutdown, "camera shutdown after failed start");
            }
            return Err(as_camera_error(camera.name(), e));
        }

        let uploader = Uploader::new(
            transport.clone(),
            queue.clone(),
            state.clone(),
            &config.backend.base_url,
            config.max_in_flight,
            config.retry.clone(),
            config.to_encode_settings(),
            events.clone(),
            stats.clone(),
        );
        let in_flight = uploader.in_flight();
        let poller = ResultPoller::new(
            transport,
            state.clone(),
            merger.clone(),
            &config.backend.base_url,
            config.poll_interval(),
            events,
            stats.clone(),
        );
        let display = DisplaySink::new(
            signal.clone(),
            config.display.visible_points,
            config.refresh_interval(),
            chart.unwrap_or_else(|| Box::new(LogChart::default())),
        );

        let tokens = StageTokens::default();
        let tasks = StageTasks {
            uploader: Some(tokio::spawn(uploader.run(tokens.uploads.clone()))),
            poller: Some(tokio::spawn(poller.run(tokens.polling.clone()))),
            display: Some(tokio::spawn(display.run(tokens.display.clone()))),
        };

        info!(
            session_id = state.id(),
            camera = camera.name(),
            queue_capacity = config.queue_capacity,
            max_in_flight = config.max_in_flight,
            "session started"
        );

        Ok(SessionHandle {
            deadline: config.max_duration().map(|d| Instant::now() + d),
            started: Instant::now(),
            state,
            config,
            camera: Some(camera),
            sink,
            queue,
            stats,
            signal,
            merger,
            in_flight,
            status_rx: Some(status_rx),
            stop_requested: CancellationToken::new(),
            tokens,
            tasks,
        })
    }
}

fn as_camera_error(camera: &str, error: PipelineError) -> PipelineError {
    match error {
        PipelineError::CameraUnavailable { .. } => error,
        other => PipelineError::camera_unavailable(camera, other.to_string()),
    }
}

async fn reset_backend(transport: &dyn Transport, base_url: &str, session_id: &str) {
    let request = TransportRequest::post(reset_url(base_url, session_id), None);
    match transport
        .exchange(request)
        .await
        .and_then(|r| r.into_success("reset_session"))
    {
        Ok(_) => info!(session_id, "backend session reset"),
        Err(e) => warn!(session_id, error = %e, "backend reset failed, continuing"),
    }
}

#[derive(Default)]
struct StageTokens {
    uploads: CancellationToken,
    polling: CancellationToken,
    display: CancellationToken,
}

impl StageTokens {
    fn cancel_all(&self) {
        self.uploads.cancel();
        self.polling.cancel();
        self.display.cancel();
    }
}

struct StageTasks {
    uploader: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
    display: Option<JoinHandle<Vec<ChartPoint>>>,
}

/// A running session.
pub struct SessionHandle {
    state: Arc<SessionState>,
    config: PipelineConfig,
    started: Instant,
    deadline: Option<Instant>,
    camera: Option<Box<dyn CameraSource>>,
    sink: FrameSink,
    queue: Arc<FrameQueue>,
    stats: Arc<PipelineStats>,
    signal: SharedSignal,
    merger: Arc<SignalMerger>,
    in_flight: Arc<AtomicUsize>,
    status_rx: Option<mpsc::Receiver<PipelineEvent>>,
    stop_requested: CancellationToken,
    tokens: StageTokens,
    tasks: StageTasks,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        self.state.id()
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Takes the status channel receiver. Only the first call returns it.
    pub fn status(&mut self) -> Option<mpsc::Receiver<PipelineEvent>> {
        self.status_rx.take()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The newest chart window, as the display would render it now.
    pub fn snapshot(&self) -> Vec<ChartPoint> {
        lock_signal(&self.signal).tail(self.config.display.visible_points)
    }

    pub fn signal(&self) -> &SharedSignal {
        &self.signal
    }

    pub fn vitals(&self) -> VitalSigns {
        self.merger.vitals()
    }

    /// Upload exchanges currently in progress.
    pub fn uploads_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Token that ends [`SessionHandle::wait`] when cancelled, e.g. from a
    /// Ctrl-C handler.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop_requested.clone()
    }

    /// Waits for the measurement duration to elapse or for a stop request.
    pub async fn wait(&self) -> StopReason {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.stop_requested.cancelled() => StopReason::Cancelled,
                _ = tokio::time::sleep_until(deadline) => StopReason::DurationElapsed,
            },
            None => {
                self.stop_requested.cancelled().await;
                StopReason::Cancelled
            }
        }
    }

    /// Tears the session down in order and summarises it.
    pub async fn stop(mut self) -> SessionSummary {
        self.stop_requested.cancel();

        self.sink.close();
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.shutdown().await {
                warn!(camera = camera.name(), error = %e, "camera shutdown failed");
            }
        }

        self.queue.close();
        let discarded = self.queue.drain();

        self.tokens.uploads.cancel();
        if let Some(task) = self.tasks.uploader.take() {
            if let Err(e) = task.await {
                error!(error = %e, "uploader task failed");
            }
        }

        self.tokens.polling.cancel();
        if let Some(task) = self.tasks.poller.take() {
            if let Err(e) = task.await {
                error!(error = %e, "poller task failed");
            }
        }

        self.tokens.display.cancel();
        let final_window = match self.tasks.display.take() {
            Some(task) => task.await.unwrap_or_else(|e| {
                error!(error = %e, "display task failed");
                self.snapshot()
            }),
            None => self.snapshot(),
        };

        let summary = SessionSummary {
            session_id: self.state.id().to_owned(),
            duration: self.started.elapsed(),
            stats: self.stats.snapshot(),
            samples_retained: lock_signal(&self.signal).len(),
            final_window,
            frames_discarded_at_stop: discarded,
            vitals: self.merger.vitals(),
        };
        info!(
            session_id = %summary.session_id,
            uploads_ok = summary.stats.uploads_ok,
            samples = summary.samples_retained,
            "session stopped"
        );
        summary
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        // Reached without stop(): stop delivery and let every stage unwind.
        self.sink.close();
        self.queue.close();
        self.tokens.cancel_all();
        self.stop_requested.cancel();
    }
}
