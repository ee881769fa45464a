//! # Uploader
//!
//! Drains the [`FrameQueue`] and POSTs each frame to the backend with at most
//! K exchanges in flight.
//!
//! ## Flow
//!
//! ```text
//! acquire slot ──► next frame ──► encode (blocking pool) ──► POST ──┬─ 2xx ─► done
//!      ▲                                                            │
//!      └──────────────── slot released ◄── dropped ◄── exhausted ◄──┴─ error ─► backoff, retry
//! ```
//!
//! A slot is taken *before* a frame is dequeued, so frames waiting for a slot
//! stay in the queue where drop-oldest still applies to them. Each frame is
//! attempted at most `retry.max_attempts` times; a frame that runs out of
//! attempts, or fails in a way that cannot be retried, is reported once as
//! [`PipelineEvent::FrameDropped`] and the loop moves on.
//!
//! Cancellation interrupts exchanges and backoff sleeps; cancelled uploads are
//! not reported as drops.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use ppg_encode::{EncodeSettings, EncodedFrame, FrameEncoder};

use super::events::{EventSender, PipelineEvent};
use super::until_cancelled;
use crate::config::RetryPolicy;
use crate::core::{Frame, FrameQueue, PipelineStats};
use crate::error::{classify, PipelineError, PipelineResult};
use crate::session::SessionState;
use crate::transport::{Transport, TransportRequest};
use crate::wire::{frames_url, UploadPayload};

/// Lifecycle of one frame's upload.
#[derive(Debug, Clone, Copy)]
pub struct UploadTicket {
    pub sequence: u64,
    pub submitted_at: Instant,
    pub attempts: u32,
}

impl UploadTicket {
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            submitted_at: Instant::now(),
            attempts: 0,
        }
    }
}

/// How one frame's upload ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    Dropped,
    Cancelled,
}

/// Reusable encoders, one per concurrent upload.
struct EncoderPool {
    settings: EncodeSettings,
    idle: Mutex<Vec<FrameEncoder>>,
}

impl EncoderPool {
    fn new(settings: EncodeSettings) -> Self {
        Self {
            settings,
            idle: Mutex::new(Vec::new()),
        }
    }

    fn take(&self) -> FrameEncoder {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| FrameEncoder::new(self.settings))
    }

    fn give_back(&self, encoder: FrameEncoder) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(encoder);
    }
}

/// Decrements the in-flight counter however the upload ends.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Everything one upload task needs, cheap to clone.
#[derive(Clone)]
struct UploadJob {
    transport: Arc<dyn Transport>,
    session: Arc<SessionState>,
    encoders: Arc<EncoderPool>,
    retry: RetryPolicy,
    url: String,
    events: EventSender,
    stats: Arc<PipelineStats>,
    in_flight: Arc<AtomicUsize>,
}

pub struct Uploader {
    queue: Arc<FrameQueue>,
    slots: Arc<Semaphore>,
    job: UploadJob,
}

impl Uploader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn Transport>,
        queue: Arc<FrameQueue>,
        session: Arc<SessionState>,
        base_url: &str,
        max_in_flight: usize,
        retry: RetryPolicy,
        encode: EncodeSettings,
        events: EventSender,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let url = frames_url(base_url, session.id());
        Self {
            queue,
            slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
            job: UploadJob {
                transport,
                session,
                encoders: Arc::new(EncoderPool::new(encode)),
                retry,
                url,
                events,
                stats,
                in_flight: Arc::new(AtomicUsize::new(0)),
            },
        }
    }

    /// Live count of exchanges in progress, shared with observers.
    pub fn in_flight(&self) -> Arc<AtomicUsize> {
        self.job.in_flight.clone()
    }

    /// Runs until the queue closes or `cancel` fires, then waits for every
    /// spawned upload to finish.
    pub async fn run(self, cancel: CancellationToken) {
        let mut tasks: JoinSet<UploadOutcome> = JoinSet::new();

        loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = self.slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                frame = self.queue.next() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            while let Some(done) = tasks.try_join_next() {
                Self::log_join(done);
            }

            let job = self.job.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = permit;
                job.upload(frame, &cancel).await
            });
        }

        while let Some(done) = tasks.join_next().await {
            Self::log_join(done);
        }
        debug!("uploader stopped");
    }

    fn log_join(result: Result<UploadOutcome, tokio::task::JoinError>) {
        if let Err(e) = result {
            error!(error = %e, "upload task failed");
        }
    }
}

impl UploadJob {
    async fn upload(&self, frame: Frame, cancel: &CancellationToken) -> UploadOutcome {
        let _in_flight = InFlightGuard::enter(&self.in_flight);
        let mut ticket = UploadTicket::new(frame.sequence);

        let body = match self.prepare(frame).await {
            Ok(body) => body,
            Err(e) => {
                self.report_drop(&ticket, &e);
                return UploadOutcome::Dropped;
            }
        };

        loop {
            ticket.attempts += 1;
            let request = TransportRequest::post(self.url.as_str(), Some(body.clone()));
            let result = until_cancelled(cancel, async {
                self.transport.exchange(request).await?.into_success("upload_frame")
            })
            .await;

            let error = match result {
                Ok(_) => {
                    PipelineStats::bump(&self.stats.uploads_ok);
                    debug!(
                        sequence = ticket.sequence,
                        attempt = ticket.attempts,
                        elapsed_ms = ticket.submitted_at.elapsed().as_millis() as u64,
                        "frame uploaded"
                    );
                    return UploadOutcome::Uploaded;
                }
                Err(e) => e,
            };

            if classify::is_cancellation(&error) {
                return self.cancelled(&ticket);
            }
            if !classify::should_retry(&error) || ticket.attempts >= self.retry.max_attempts {
                self.report_drop(&ticket, &error);
                return UploadOutcome::Dropped;
            }

            let delay = self.retry.delay_after(ticket.attempts);
            PipelineStats::bump(&self.stats.upload_retries);
            warn!(
                sequence = ticket.sequence,
                attempt = ticket.attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "upload failed, retrying"
            );
            let slept = until_cancelled(cancel, async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await;
            if slept.is_err() {
                return self.cancelled(&ticket);
            }
        }
    }

    fn cancelled(&self, ticket: &UploadTicket) -> UploadOutcome {
        debug!(sequence = ticket.sequence, attempt = ticket.attempts, "upload cancelled");
        UploadOutcome::Cancelled
    }

    /// Encodes off the async runtime and builds the JSON body.
    async fn prepare(&self, frame: Frame) -> PipelineResult<serde_json::Value> {
        let encoders = self.encoders.clone();
        let image = frame.image.clone();
        let sequence = frame.sequence;
        let encoded: Result<EncodedFrame, ppg_encode::EncodeError> =
            tokio::task::spawn_blocking(move || {
                let mut encoder = encoders.take();
                let result = encoder.encode(image.as_raw());
                encoders.give_back(encoder);
                result
            })
            .await
            .map_err(|e| PipelineError::state("encoding", "encode_frame", e.to_string()))?;
        let encoded = encoded.map_err(|e| PipelineError::encoding(sequence, e))?;

        let payload = UploadPayload::new(self.session.id(), &frame, &encoded);
        Ok(serde_json::to_value(&payload)?)
    }

    fn report_drop(&self, ticket: &UploadTicket, error: &PipelineError) {
        let dropped =
            PipelineError::permanent_upload(ticket.sequence, ticket.attempts, error.to_string());
        PipelineStats::bump(&self.stats.frames_dropped_upload);
        warn!(
            sequence = ticket.sequence,
            attempts = ticket.attempts,
            error = %dropped,
            "frame dropped"
        );
        self.events.emit(PipelineEvent::FrameDropped {
            sequence: ticket.sequence,
            attempts: ticket.attempts,
            reason: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard_tracks_scope() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let _a = InFlightGuard::enter(&counter);
            let _b = InFlightGuard::enter(&counter);
            assert_eq!(counter.load(Ordering::Acquire), 2);
        }
        assert_eq!(counter.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_encoder_pool_reuses_returned_encoders() {
        let pool = EncoderPool::new(EncodeSettings::default());
        let encoder = pool.take();
        pool.give_back(encoder);
        assert_eq!(pool.idle.lock().unwrap().len(), 1);
        let _encoder = pool.take();
        assert!(pool.idle.lock().unwrap().is_empty());
    }
}
