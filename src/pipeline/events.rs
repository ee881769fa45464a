//! Status events published by the pipeline stages.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

use crate::core::SampleKey;
use crate::wire::{BloodPressure, HeartRate};

/// Something a user-facing layer may want to show.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A frame was given up on after `attempts` upload attempts.
    FrameDropped {
        sequence: u64,
        attempts: u32,
        reason: String,
    },
    /// One poll tick failed; the poller carries on at the next tick.
    PollFailed { cursor: Option<SampleKey>, reason: String },
    /// A poll batch landed in the signal buffer.
    SamplesMerged {
        inserted: usize,
        replaced: usize,
        evicted: usize,
        newest_key: Option<SampleKey>,
    },
    /// The backend reported new vital signs.
    VitalsUpdated {
        heart_rate: Option<HeartRate>,
        blood_pressure: Option<BloodPressure>,
    },
    /// The backend status string changed.
    BackendStatus(String),
}

/// Non-blocking sender side of the status channel.
///
/// Events are dropped when the receiver lags or is gone.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<PipelineEvent>,
}

impl EventSender {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Publishes `event`, returning whether it was accepted.
    pub fn emit(&self, event: PipelineEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                trace!(?event, "status channel full, event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
