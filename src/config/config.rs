//! # Pipeline Configuration
//!
//! This module provides the configuration structure for a capture session and
//! its validation. It is the common interface between the CLI, configuration
//! files, and the pipeline components.
//!
//! ## Configuration Parameters
//!
//! | Parameter | Default | Description |
//! |-----------|---------|-------------|
//! | `backend.base_url` | `http://127.0.0.1:8000/api` | Backend root URL |
//! | `backend.request_timeout_ms` | 10000 | Per-request timeout |
//! | `queue_capacity` | 3 | Frames held between capture and upload (N) |
//! | `max_in_flight` | 2 | Concurrent uploads (K) |
//! | `retry.max_attempts` | 3 | Upload attempts per frame, first try included |
//! | `retry.base_delay_ms` / `factor` / `max_delay_ms` | 200 / 2.0 / 2000 | Exponential backoff |
//! | `poll_interval_ms` | 500 | Result polling cadence |
//! | `retention.max_samples` / `max_span_ms` | 1800 / 60000 | Signal buffer retention |
//! | `display.refresh_interval_ms` / `visible_points` | 100 / 150 | Chart window |
//! | `capture.frame_stride` | 2 | Upload every n-th delivered frame |
//! | `capture.max_duration_ms` | 40000 | Measurement length, `null` for unbounded |
//! | `capture.jpeg_quality` | 80 | Upload JPEG quality (1-100) |
//! | `capture.max_long_side` | `null` | Optional downscale before upload |
//!
//! Every field has a default, so a configuration file only needs the values it
//! overrides:
//!
//! ```rust
//! use ppg_link::config::PipelineConfig;
//!
//! let config: PipelineConfig =
//!     serde_json::from_str(r#"{ "queue_capacity": 4, "retry": { "max_attempts": 5 } }"#).unwrap();
//! assert_eq!(config.queue_capacity, 4);
//! assert_eq!(config.retry.max_attempts, 5);
//! assert_eq!(config.retry.base_delay_ms, 200);
//! assert!(config.validate().is_ok());
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Where and how to reach the PPG backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL; session routes are appended below it.
    pub base_url: String,
    /// Timeout applied to every request.
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Bounded exponential backoff for frame uploads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per frame, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay_ms: u64,
    /// Multiplier applied per further attempt.
    pub factor: f64,
    /// Upper bound for any single delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            factor: 2.0,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// With the defaults: 200ms after the first failure, 400ms after the second.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31) as i32;
        let millis = (self.base_delay_ms as f64 * self.factor.powi(exp)).min(self.max_delay_ms as f64);
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

/// How much signal history the buffer keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionWindow {
    /// Maximum number of samples.
    pub max_samples: usize,
    /// Maximum distance between newest and oldest key, in key units (ms).
    pub max_span_ms: Option<i64>,
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self {
            max_samples: 1_800,
            max_span_ms: Some(60_000),
        }
    }
}

/// Chart refresh settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub refresh_interval_ms: u64,
    /// Points handed to the chart per refresh (newest window).
    pub visible_points: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 100,
            visible_points: 150,
        }
    }
}

/// Capture-side knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Only every n-th delivered frame enters the queue.
    pub frame_stride: u32,
    /// The session stops itself after this long. `None` runs until stopped.
    pub max_duration_ms: Option<u64>,
    pub jpeg_quality: u8,
    pub max_long_side: Option<u32>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            frame_stride: 2,
            max_duration_ms: Some(40_000),
            jpeg_quality: 80,
            max_long_side: None,
        }
    }
}

/// Configuration structure for a capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub backend: BackendConfig,
    /// Frame queue capacity (N). Overflow drops the oldest frame.
    pub queue_capacity: usize,
    /// Maximum concurrent uploads (K).
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
    pub poll_interval_ms: u64,
    pub retention: RetentionWindow,
    pub display: DisplayConfig,
    pub capture: CaptureSettings,
    /// Capacity of the status event channel; events beyond it are dropped.
    pub status_channel_capacity: usize,
    /// Ask the backend to reset its per-session state when the session starts.
    pub reset_on_start: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            queue_capacity: 3,
            max_in_flight: 2,
            retry: RetryPolicy::default(),
            poll_interval_ms: 500,
            retention: RetentionWindow::default(),
            display: DisplayConfig::default(),
            capture: CaptureSettings::default(),
            status_channel_capacity: 256,
            reset_on_start: true,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::io(format!("read config {}", path.display()), e))?;
        serde_json::from_str(&text)
            .map_err(|e| PipelineError::config("config_file", path.display().to_string(), e.to_string()))
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> PipelineResult<()> {
        if let Err(e) = reqwest::Url::parse(&self.backend.base_url) {
            return Err(PipelineError::config(
                "backend.base_url",
                &self.backend.base_url,
                e.to_string(),
            ));
        }
        if self.backend.request_timeout_ms == 0 {
            return Err(PipelineError::config(
                "backend.request_timeout_ms",
                "0",
                "must be greater than 0",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(PipelineError::config("queue_capacity", "0", "must be greater than 0"));
        }
        if self.max_in_flight == 0 {
            return Err(PipelineError::config("max_in_flight", "0", "must be greater than 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::config(
                "retry.max_attempts",
                "0",
                "must allow at least one attempt",
            ));
        }
        if !(self.retry.factor >= 1.0) {
            return Err(PipelineError::config(
                "retry.factor",
                self.retry.factor.to_string(),
                "must be at least 1.0",
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(PipelineError::config(
                "retry.base_delay_ms",
                self.retry.base_delay_ms.to_string(),
                "must not exceed retry.max_delay_ms",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(PipelineError::config("poll_interval_ms", "0", "must be greater than 0"));
        }
        if self.retention.max_samples == 0 {
            return Err(PipelineError::config(
                "retention.max_samples",
                "0",
                "must be greater than 0",
            ));
        }
        if let Some(span) = self.retention.max_span_ms {
            if span <= 0 {
                return Err(PipelineError::config(
                    "retention.max_span_ms",
                    span.to_string(),
                    "must be positive",
                ));
            }
        }
        if self.display.refresh_interval_ms == 0 || self.display.visible_points == 0 {
            return Err(PipelineError::config(
                "display",
                format!(
                    "{}ms/{} points",
                    self.display.refresh_interval_ms, self.display.visible_points
                ),
                "refresh interval and visible points must be greater than 0",
            ));
        }
        if self.capture.frame_stride == 0 {
            return Err(PipelineError::config("capture.frame_stride", "0", "must be at least 1"));
        }
        if self.capture.max_duration_ms == Some(0) {
            return Err(PipelineError::config(
                "capture.max_duration_ms",
                "0",
                "use null for an unbounded session",
            ));
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(PipelineError::config(
                "capture.jpeg_quality",
                self.capture.jpeg_quality.to_string(),
                "must be between 1 and 100",
            ));
        }
        if self.status_channel_capacity == 0 {
            return Err(PipelineError::config(
                "status_channel_capacity",
                "0",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.request_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.display.refresh_interval_ms)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.capture.max_duration_ms.map(Duration::from_millis)
    }

    /// Convert the capture knobs into encoder settings.
    pub fn to_encode_settings(&self) -> ppg_encode::EncodeSettings {
        ppg_encode::EncodeSettings {
            jpeg_quality: self.capture.jpeg_quality,
            max_long_side: self.capture.max_long_side,
        }
    }
}
