//! # Result Poller
//!
//! Asks the backend for newly computed samples on a fixed cadence, hands them
//! to the [`SignalMerger`] and advances the session cursor.
//!
//! The cadence is independent of the frame rate. A tick that overruns (slow
//! backend) delays the next one instead of firing a burst. A failed tick is
//! reported and the poller simply waits for the next one.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::events::{EventSender, PipelineEvent};
use super::merger::SignalMerger;
use super::until_cancelled;
use crate::core::{IngestReport, PipelineStats};
use crate::error::{classify, PipelineError, PipelineResult};
use crate::session::SessionState;
use crate::transport::{Transport, TransportRequest};
use crate::wire::{samples_url, PollResponse};

pub struct ResultPoller {
    transport: Arc<dyn Transport>,
    session: Arc<SessionState>,
    merger: Arc<SignalMerger>,
    url: String,
    period: Duration,
    events: EventSender,
    stats: Arc<PipelineStats>,
}

impl ResultPoller {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<SessionState>,
        merger: Arc<SignalMerger>,
        base_url: &str,
        period: Duration,
        events: EventSender,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let url = samples_url(base_url, session.id());
        Self {
            transport,
            session,
            merger,
            url,
            period,
            events,
            stats,
        }
    }

    /// One poll: fetch, merge, then advance the cursor to the newest key
    /// received, including keys of skipped samples.
    pub async fn poll_once(&self) -> PipelineResult<IngestReport> {
        let mut request = TransportRequest::get(self.url.as_str());
        if let Some(cursor) = self.session.cursor() {
            request = request.with_query("since", cursor);
        }

        let body = self
            .transport
            .exchange(request)
            .await?
            .into_success("poll_samples")?
            .body;
        let response = PollResponse::from_json(&body).map_err(|e| {
            PipelineError::protocol("poll_samples", format!("invalid JSON body: {e}"))
        })?;
        if response.skipped > 0 {
            debug!(skipped = response.skipped, "unusable samples left out of batch");
        }

        let newest = response.max_key();
        let report = self.merger.apply(response, SystemTime::now());
        if let Some(key) = newest {
            let cursor = self.session.advance_cursor(key);
            trace!(cursor, "cursor advanced");
        }
        Ok(report)
    }

    /// Polls every period until `cancel` fires. An in-flight poll is dropped
    /// on cancellation.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match until_cancelled(&cancel, self.poll_once()).await {
                Err(e) if classify::is_cancellation(&e) => break,
                Ok(report) => {
                    PipelineStats::bump(&self.stats.polls_ok);
                    trace!(inserted = report.inserted, "poll complete");
                }
                Err(e) => {
                    PipelineStats::bump(&self.stats.polls_failed);
                    let cursor = self.session.cursor();
                    warn!(cursor = ?cursor, error = %e, "poll failed");
                    self.events.emit(PipelineEvent::PollFailed {
                        cursor,
                        reason: e.to_string(),
                    });
                }
            }
        }
        debug!(cursor = ?self.session.cursor(), "poller stopped");
    }
}
