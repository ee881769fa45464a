//! `reqwest`-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use super::{Method, Transport, TransportRequest, TransportResponse};
use crate::error::{PipelineError, PipelineResult};

/// HTTP transport sharing one connection pool across the pipeline.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Client whose every request gives up after `timeout`.
    pub fn new(timeout: Duration) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                PipelineError::config("backend.request_timeout_ms", format!("{timeout:?}"), e.to_string())
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(&self, request: TransportRequest) -> PipelineResult<TransportResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            PipelineError::transient_network("http_exchange", e.to_string())
                .with_metadata("url", request.url.as_str())
                .with_source(e)
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            PipelineError::transient_network("http_read_body", e.to_string())
                .with_status(status)
                .with_source(e)
        })?;
        trace!(url = %request.url, status, bytes = body.len(), "exchange complete");

        Ok(TransportResponse::new(status, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_backend_is_transient() {
        let transport = HttpTransport::new(Duration::from_millis(500)).unwrap();
        // Nothing listens on the discard port.
        let err = transport
            .exchange(TransportRequest::get("http://127.0.0.1:9/api/sessions/x/samples"))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "transient_network");
        assert_eq!(err.status(), None);
    }
}
