//! # Configuration Module
//!
//! This module provides the configuration structures for a PPG capture session.

pub mod config;

pub use config::{
    BackendConfig, CaptureSettings, DisplayConfig, PipelineConfig, RetentionWindow, RetryPolicy,
};
