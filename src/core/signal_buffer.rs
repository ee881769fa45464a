//! # Signal Buffer
//!
//! Key-ordered store of PPG samples with bounded retention.
//!
//! Invariants, held after every mutation:
//! - keys are strictly increasing when iterated
//! - no key appears twice; a later write for the same key replaces the earlier one
//! - `len() <= retention.max_samples`, and the newest and oldest keys are at most
//!   `retention.max_span_ms` apart

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::config::RetentionWindow;

/// Backend time key, milliseconds from the backend's session origin.
pub type SampleKey = i64;

/// One computed PPG value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PpgSample {
    pub key: SampleKey,
    pub value: f64,
    pub received_at: SystemTime,
}

/// A (time, value) pair handed to the chart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    pub key: SampleKey,
    pub value: f64,
}

/// What one ingest did to the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub replaced: usize,
    pub evicted: usize,
}

/// The buffer as shared between its single writer and its readers.
pub type SharedSignal = Arc<Mutex<SignalBuffer>>;

/// Locks the shared buffer. A panic while holding the guard leaves the map
/// consistent, so poisoning is ignored.
pub fn lock_signal(shared: &Mutex<SignalBuffer>) -> MutexGuard<'_, SignalBuffer> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct SignalBuffer {
    samples: BTreeMap<SampleKey, PpgSample>,
    retention: RetentionWindow,
}

impl SignalBuffer {
    pub fn new(retention: RetentionWindow) -> Self {
        Self {
            samples: BTreeMap::new(),
            retention,
        }
    }

    pub fn shared(retention: RetentionWindow) -> SharedSignal {
        Arc::new(Mutex::new(Self::new(retention)))
    }

    /// Insert a batch in arrival order, then enforce retention.
    pub fn insert_batch(&mut self, batch: impl IntoIterator<Item = PpgSample>) -> IngestReport {
        let mut report = IngestReport::default();
        for sample in batch {
            if self.samples.insert(sample.key, sample).is_some() {
                report.replaced += 1;
            } else {
                report.inserted += 1;
            }
        }
        report.evicted = self.evict();
        report
    }

    fn evict(&mut self) -> usize {
        let mut evicted = 0;
        while self.samples.len() > self.retention.max_samples.max(1) {
            self.samples.pop_first();
            evicted += 1;
        }
        if let Some(span) = self.retention.max_span_ms {
            while let (Some((&first, _)), Some((&last, _))) =
                (self.samples.first_key_value(), self.samples.last_key_value())
            {
                if last.saturating_sub(first) <= span {
                    break;
                }
                self.samples.pop_first();
                evicted += 1;
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, key: SampleKey) -> Option<&PpgSample> {
        self.samples.get(&key)
    }

    pub fn first_key(&self) -> Option<SampleKey> {
        self.samples.keys().next().copied()
    }

    pub fn last_key(&self) -> Option<SampleKey> {
        self.samples.keys().next_back().copied()
    }

    /// All samples in key order.
    pub fn iter(&self) -> impl Iterator<Item = &PpgSample> {
        self.samples.values()
    }

    /// The newest `limit` points, in key order.
    pub fn tail(&self, limit: usize) -> Vec<ChartPoint> {
        let mut points: Vec<ChartPoint> = self
            .samples
            .values()
            .rev()
            .take(limit)
            .map(|s| ChartPoint {
                key: s.key,
                value: s.value,
            })
            .collect();
        points.reverse();
        points
    }
}
