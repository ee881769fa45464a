//! # PPG Link
//!
//! Client side of a remote photoplethysmography (PPG) measurement: camera
//! frames are captured, queued, uploaded to a backend processor, and the PPG
//! samples it computes are polled back, merged into an ordered signal and
//! rendered as a live chart.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `capture`: camera seam and the frame sink that feeds the queue
//! - `core`: frame queue, signal buffer and shared counters
//! - `pipeline`: uploader, result poller, signal merger and display stages
//! - `transport`: request/response seam to the backend, HTTP implementation
//! - `wire`: JSON bodies and routes spoken with the backend
//! - `session`: builder, handle and ordered teardown of one measurement
//! - `config`: configuration loading and validation
//! - `error`: error taxonomy and classification
//!
//! ## Features
//!
//! - **Bounded memory**: drop-oldest frame queue, bounded signal retention
//! - **Never stalls the camera**: delivery is a non-blocking enqueue
//! - **Bounded retries**: exponential backoff, each lost frame reported once
//! - **Ordered signal**: out-of-order and overlapping poll batches reconciled
//! - **Clean shutdown**: no request outlives `SessionHandle::stop`
//!
//! ## Example
//!
//! ```rust,no_run
//! use ppg_link::{PipelineConfig, SessionBuilder, SyntheticCamera};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = PipelineConfig::default();
//! config.backend.base_url = "http://10.0.2.2:8000/api".to_string();
//!
//! let session = SessionBuilder::new()
//!     .with_config(config)
//!     .with_camera(SyntheticCamera::new(320, 240, 30))
//!     .start()
//!     .await?;
//! session.wait().await;
//! let summary = session.stop().await;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod transport;
pub mod wire;

/// Re-export error types for convenience
pub use error::{HasSeverity, PipelineError, PipelineResult, Retryable};

pub use capture::{CameraSource, Delivery, FrameSink, SyntheticCamera};
pub use config::PipelineConfig;
pub use core::{ChartPoint, Frame, FrameImage, FrameQueue, PixelFormat, PpgSample, SignalBuffer};
pub use pipeline::{ChartSink, PipelineEvent, VitalSigns};
pub use session::{SessionBuilder, SessionHandle, SessionSummary, StopReason};
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse};
