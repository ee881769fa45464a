//! # Transport
//!
//! Request/response seam between the pipeline and the backend. The uploader,
//! the poller and the session reset call all speak through one
//! [`Transport`], which keeps the network swappable in tests.
//!
//! A transport reports *delivery* failures (connect, timeout, reset) as
//! errors and hands every HTTP answer back as a [`TransportResponse`],
//! whatever its status. [`TransportResponse::into_success`] turns non-2xx
//! answers into [`PipelineError::TransientNetwork`] carrying the status, so
//! callers can classify them with
//! [`classify::should_retry`](crate::error::classify::should_retry).

pub mod http;

pub use http::HttpTransport;

use async_trait::async_trait;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outbound exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl TransportRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            query: Vec::new(),
            body,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Value of the first query parameter named `key`.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The backend's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Passes 2xx answers through and maps everything else to a network
    /// error carrying the status.
    pub fn into_success(self, operation: &str) -> PipelineResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let snippet: String = String::from_utf8_lossy(&self.body).chars().take(120).collect();
        Err(
            PipelineError::transient_network(operation, format!("HTTP {}: {}", self.status, snippet))
                .with_status(self.status),
        )
    }
}

/// Performs request/response exchanges with the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(&self, request: TransportRequest) -> PipelineResult<TransportResponse>;
}
