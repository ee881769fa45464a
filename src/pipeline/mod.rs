//! # Pipeline Stages
//!
//! The concurrent legs of a session:
//!
//! ```text
//!            ┌───────────┐  POST frames   ┌─────────┐
//! FrameQueue │ Uploader  │ ─────────────► │         │
//!    ──────► │ (K slots) │                │ backend │
//!            └───────────┘                │         │
//!            ┌───────────┐  GET samples   │         │
//!            │  Poller   │ ◄───────────── │         │
//!            └─────┬─────┘                └─────────┘
//!                  ▼
//!            SignalMerger ──► SignalBuffer ──► DisplaySink ──► ChartSink
//! ```
//!
//! Each stage runs as its own tokio task with its own cancellation token so
//! the session can stop them in a fixed order. Stages report local failures
//! on the status channel ([`events`]) and keep running. A stage interrupted
//! by its token sees [`PipelineError::SessionCancelled`], which is never
//! reported.

pub mod display;
pub mod events;
pub mod merger;
pub mod poller;
pub mod uploader;

pub use display::{sparkline, ChartSink, DisplaySink, LogChart};
pub use events::{EventSender, PipelineEvent};
pub use merger::{SignalMerger, VitalSigns};
pub use poller::ResultPoller;
pub use uploader::{UploadOutcome, UploadTicket, Uploader};

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, PipelineResult};

/// Runs `work` unless `cancel` fires first, which yields
/// [`PipelineError::SessionCancelled`].
pub(crate) async fn until_cancelled<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = PipelineResult<T>>,
) -> PipelineResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::SessionCancelled),
        result = work => result,
    }
}
