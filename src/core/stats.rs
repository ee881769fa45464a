//! Lock-free pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every stage of a session.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub frames_delivered: AtomicU64,
    pub frames_skipped: AtomicU64,
    pub frames_enqueued: AtomicU64,
    pub frames_evicted: AtomicU64,
    pub uploads_ok: AtomicU64,
    pub upload_retries: AtomicU64,
    pub frames_dropped_upload: AtomicU64,
    pub polls_ok: AtomicU64,
    pub polls_failed: AtomicU64,
    pub samples_merged: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_delivered: u64,
    pub frames_skipped: u64,
    pub frames_enqueued: u64,
    pub frames_evicted: u64,
    pub uploads_ok: u64,
    pub upload_retries: u64,
    pub frames_dropped_upload: u64,
    pub polls_ok: u64,
    pub polls_failed: u64,
    pub samples_merged: u64,
}

impl PipelineStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_delivered: load(&self.frames_delivered),
            frames_skipped: load(&self.frames_skipped),
            frames_enqueued: load(&self.frames_enqueued),
            frames_evicted: load(&self.frames_evicted),
            uploads_ok: load(&self.uploads_ok),
            upload_retries: load(&self.upload_retries),
            frames_dropped_upload: load(&self.frames_dropped_upload),
            polls_ok: load(&self.polls_ok),
            polls_failed: load(&self.polls_failed),
            samples_merged: load(&self.samples_merged),
        }
    }
}
