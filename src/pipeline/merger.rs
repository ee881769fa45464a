//! # Signal Merger
//!
//! Sole writer of the session's [`SignalBuffer`]. Poll batches arrive
//! unordered, possibly overlapping earlier batches; the buffer's key order
//! and last-write-wins rule reconcile them. Vital signs riding along with a
//! poll are kept as "latest" readings.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use tracing::{debug, info};

use super::events::{EventSender, PipelineEvent};
use crate::core::{lock_signal, IngestReport, PipelineStats, PpgSample, SharedSignal};
use crate::wire::{BloodPressure, HeartRate, PollResponse};

/// Latest vital signs reported by the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VitalSigns {
    pub heart_rate: Option<HeartRate>,
    pub blood_pressure: Option<BloodPressure>,
    pub updated_at: Option<SystemTime>,
}

#[derive(Debug, Default)]
struct Latest {
    vitals: VitalSigns,
    status: Option<String>,
}

#[derive(Debug)]
pub struct SignalMerger {
    signal: SharedSignal,
    latest: Mutex<Latest>,
    events: EventSender,
    stats: Arc<PipelineStats>,
}

impl SignalMerger {
    pub fn new(signal: SharedSignal, events: EventSender, stats: Arc<PipelineStats>) -> Self {
        Self {
            signal,
            latest: Mutex::new(Latest::default()),
            events,
            stats,
        }
    }

    /// Inserts a batch and enforces retention. The guard is held for the
    /// insertion only.
    pub fn ingest(&self, batch: Vec<PpgSample>) -> IngestReport {
        if batch.is_empty() {
            return IngestReport::default();
        }
        let count = batch.len() as u64;
        let (report, newest_key) = {
            let mut buffer = lock_signal(&self.signal);
            let report = buffer.insert_batch(batch);
            (report, buffer.last_key())
        };

        PipelineStats::add(&self.stats.samples_merged, count);
        debug!(
            inserted = report.inserted,
            replaced = report.replaced,
            evicted = report.evicted,
            "samples merged"
        );
        self.events.emit(PipelineEvent::SamplesMerged {
            inserted: report.inserted,
            replaced: report.replaced,
            evicted: report.evicted,
            newest_key,
        });
        report
    }

    /// Applies one poll response: samples, then vitals and backend status.
    pub fn apply(&self, response: PollResponse, received_at: SystemTime) -> IngestReport {
        let PollResponse {
            samples,
            heart_rate,
            blood_pressure,
            status,
            ..
        } = response;

        let report = self.ingest(
            samples
                .into_iter()
                .map(|s| s.into_sample(received_at))
                .collect(),
        );

        if heart_rate.is_some() || blood_pressure.is_some() {
            self.record_vitals(heart_rate, blood_pressure, received_at);
        }
        if let Some(status) = status {
            self.record_status(status);
        }
        report
    }

    fn record_vitals(
        &self,
        heart_rate: Option<HeartRate>,
        blood_pressure: Option<BloodPressure>,
        at: SystemTime,
    ) {
        let changed = {
            let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
            let vitals = &mut latest.vitals;
            let mut changed = false;
            if heart_rate.is_some() && vitals.heart_rate != heart_rate {
                vitals.heart_rate = heart_rate.clone();
                changed = true;
            }
            if blood_pressure.is_some() && vitals.blood_pressure != blood_pressure {
                vitals.blood_pressure = blood_pressure.clone();
                changed = true;
            }
            if changed {
                vitals.updated_at = Some(at);
            }
            changed
        };

        if changed {
            if let Some(hr) = &heart_rate {
                info!(bpm = hr.bpm, quality = ?hr.signal_quality, "heart rate updated");
            }
            if let Some(bp) = &blood_pressure {
                info!(systolic = bp.systolic, diastolic = bp.diastolic, "blood pressure updated");
            }
            self.events.emit(PipelineEvent::VitalsUpdated {
                heart_rate,
                blood_pressure,
            });
        }
    }

    fn record_status(&self, status: String) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if latest.status.as_deref() != Some(status.as_str()) {
            debug!(%status, "backend status changed");
            latest.status = Some(status.clone());
            drop(latest);
            self.events.emit(PipelineEvent::BackendStatus(status));
        }
    }

    pub fn vitals(&self) -> VitalSigns {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .vitals
            .clone()
    }

    pub fn backend_status(&self) -> Option<String> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
            .clone()
    }

    pub fn signal(&self) -> &SharedSignal {
        &self.signal
    }
}
