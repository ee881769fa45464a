//! # Backend Wire Format
//!
//! JSON bodies exchanged with the PPG backend and the routes they travel on.
//!
//! Upload, `POST {base}/sessions/{id}/frames`:
//!
//! ```json
//! {"sessionId":"a1b2","sequence":7,"capturedAt":1718000000123,
//!  "frame":"/9j/4AAQ...","width":320,"height":240,"encoding":"jpeg"}
//! ```
//!
//! Poll, `GET {base}/sessions/{id}/samples?since=<cursor>`:
//!
//! ```json
//! {"samples":[{"key":1500,"value":0.42}],
//!  "heartRate":{"bpm":72.0,"confidence":0.8,"signalQuality":"Good"},
//!  "bloodPressure":{"systolic":118.0,"diastolic":76.0,"category":"Normal"},
//!  "status":"processing"}
//! ```
//!
//! Poll responses are decoded sample by sample. A sample without an integer
//! key or with a non-finite value is skipped; the rest of the batch still
//! lands. Bare `NaN`/`Infinity` literals, which some backends emit for a flat
//! signal, are read as `null`.

use std::time::SystemTime;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::{Frame, PpgSample, SampleKey};

/// Encoding tag sent with every uploaded frame.
pub const FRAME_ENCODING: &str = "jpeg";

pub fn frames_url(base: &str, session_id: &str) -> String {
    format!("{}/sessions/{}/frames", base.trim_end_matches('/'), session_id)
}

pub fn samples_url(base: &str, session_id: &str) -> String {
    format!("{}/sessions/{}/samples", base.trim_end_matches('/'), session_id)
}

pub fn reset_url(base: &str, session_id: &str) -> String {
    format!("{}/sessions/{}/reset", base.trim_end_matches('/'), session_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub session_id: String,
    pub sequence: u64,
    /// Epoch milliseconds.
    pub captured_at: u64,
    /// Base64 (standard alphabet, padded) of the encoded frame.
    pub frame: String,
    pub width: u32,
    pub height: u32,
    pub encoding: String,
}

impl UploadPayload {
    pub fn new(session_id: &str, frame: &Frame, encoded: &ppg_encode::EncodedFrame) -> Self {
        Self {
            session_id: session_id.to_owned(),
            sequence: frame.sequence,
            captured_at: frame.captured_at_ms,
            frame: STANDARD.encode(&encoded.data),
            width: encoded.width,
            height: encoded.height,
            encoding: FRAME_ENCODING.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireSample {
    pub key: SampleKey,
    pub value: f64,
}

impl WireSample {
    pub fn into_sample(self, received_at: SystemTime) -> PpgSample {
        PpgSample {
            key: self.key,
            value: self.value,
            received_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRate {
    pub bpm: f64,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub signal_quality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: f64,
    pub diastolic: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollResponse {
    pub samples: Vec<WireSample>,
    pub heart_rate: Option<HeartRate>,
    pub blood_pressure: Option<BloodPressure>,
    pub status: Option<String>,
    /// Samples left out of `samples` because their key or value was unusable.
    pub skipped: usize,
    /// Highest key among skipped samples that still carried one.
    pub skipped_max_key: Option<SampleKey>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPollResponse {
    samples: Option<Vec<Value>>,
    heart_rate: Option<Value>,
    blood_pressure: Option<Value>,
    status: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawSample {
    key: Option<SampleKey>,
    value: Option<f64>,
}

impl PollResponse {
    /// Decodes a poll body. Fails only when the body as a whole is not a
    /// JSON object; unusable samples and vitals are skipped.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawPollResponse = match serde_json::from_slice(body) {
            Ok(raw) => raw,
            Err(_) => serde_json::from_str(&null_non_finite(&String::from_utf8_lossy(body)))?,
        };

        let mut response = PollResponse::default();
        for entry in raw.samples.unwrap_or_default() {
            match serde_json::from_value::<RawSample>(entry) {
                Ok(RawSample {
                    key: Some(key),
                    value: Some(value),
                }) if value.is_finite() => response.samples.push(WireSample { key, value }),
                Ok(RawSample { key, value }) => {
                    debug!(key = ?key, value = ?value, "skipping sample without usable key or value");
                    response.skip(key);
                }
                Err(e) => {
                    debug!(error = %e, "skipping malformed sample");
                    response.skip(None);
                }
            }
        }

        response.heart_rate = raw
            .heart_rate
            .and_then(|v| decode_reading::<HeartRate>(v, "heartRate"))
            .filter(|hr| hr.bpm.is_finite());
        response.blood_pressure = raw
            .blood_pressure
            .and_then(|v| decode_reading::<BloodPressure>(v, "bloodPressure"))
            .filter(|bp| bp.systolic.is_finite() && bp.diastolic.is_finite());
        response.status = raw.status.and_then(|v| match v {
            Value::String(status) => Some(status),
            _ => None,
        });
        Ok(response)
    }

    fn skip(&mut self, key: Option<SampleKey>) {
        self.skipped += 1;
        self.skipped_max_key = self.skipped_max_key.max(key);
    }

    /// Highest sample key received, counting skipped samples that had one.
    pub fn max_key(&self) -> Option<SampleKey> {
        self.samples
            .iter()
            .map(|s| s.key)
            .chain(self.skipped_max_key)
            .max()
    }
}

fn decode_reading<T: serde::de::DeserializeOwned>(value: Value, field: &str) -> Option<T> {
    if value.is_null() {
        return None;
    }
    serde_json::from_value(value)
        .map_err(|e| debug!(field, error = %e, "skipping unreadable vital sign"))
        .ok()
}

/// Rewrites bare `NaN`, `Infinity` and `-Infinity` outside strings as `null`.
fn null_non_finite(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else {
            let literal = ["NaN", "-Infinity", "Infinity"]
                .into_iter()
                .find(|literal| rest.starts_with(literal));
            if let Some(literal) = literal {
                out.push_str("null");
                rest = &rest[literal.len()..];
                continue;
            }
            in_string = c == '"';
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}
