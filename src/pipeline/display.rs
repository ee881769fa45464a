//! # Display Sink
//!
//! Read side of the signal buffer. On its own refresh cadence it copies the
//! newest window of points out of the buffer and hands it to a [`ChartSink`].
//! The buffer guard is held for the copy only, never across a render.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::core::{lock_signal, ChartPoint, SharedSignal};

/// Charting collaborator. Receives ordered (key, value) points; gives no
/// feedback.
pub trait ChartSink: Send {
    fn render(&mut self, points: &[ChartPoint]);
}

/// Chart that writes a one-line digest of each window to the log.
#[derive(Debug, Default)]
pub struct LogChart {
    last_key: Option<i64>,
}

impl ChartSink for LogChart {
    fn render(&mut self, points: &[ChartPoint]) {
        let newest = points.last();
        let newest_key = newest.map(|p| p.key);
        if newest_key == self.last_key {
            return;
        }
        self.last_key = newest_key;
        if let Some(p) = newest {
            debug!(points = points.len(), key = p.key, value = p.value, "chart");
        }
    }
}

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Renders the last `width` points as a unicode sparkline scaled to their own
/// min/max.
pub fn sparkline(points: &[ChartPoint], width: usize) -> String {
    let window = &points[points.len().saturating_sub(width)..];
    let (lo, hi) = window
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.value), hi.max(p.value))
        });
    let span = hi - lo;
    window
        .iter()
        .map(|p| {
            if span <= f64::EPSILON {
                BARS[BARS.len() / 2]
            } else {
                let level = ((p.value - lo) / span * (BARS.len() - 1) as f64).round() as usize;
                BARS[level.min(BARS.len() - 1)]
            }
        })
        .collect()
}

pub struct DisplaySink {
    signal: SharedSignal,
    visible_points: usize,
    refresh: Duration,
    chart: Box<dyn ChartSink>,
}

impl DisplaySink {
    pub fn new(
        signal: SharedSignal,
        visible_points: usize,
        refresh: Duration,
        chart: Box<dyn ChartSink>,
    ) -> Self {
        Self {
            signal,
            visible_points: visible_points.max(1),
            refresh,
            chart,
        }
    }

    /// The newest window, in key order.
    pub fn snapshot(&self) -> Vec<ChartPoint> {
        lock_signal(&self.signal).tail(self.visible_points)
    }

    /// Copies a snapshot and renders it, returning what was rendered.
    pub fn render_once(&mut self) -> Vec<ChartPoint> {
        let points = self.snapshot();
        self.chart.render(&points);
        points
    }

    /// Refreshes until `cancel` fires, then renders one final snapshot and
    /// returns it.
    pub async fn run(mut self, cancel: CancellationToken) -> Vec<ChartPoint> {
        let mut ticker = interval(self.refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let points = self.render_once();
                    trace!(points = points.len(), "display refreshed");
                }
            }
        }
        let last = self.render_once();
        debug!(points = last.len(), "display stopped");
        last
    }
}
