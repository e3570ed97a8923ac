//! HTTPS transport for webhook POSTs.

use std::time::Duration;

use reqwest::{header, redirect, Client};
use tracing::debug;

use domain::errors::TransportError;
use domain::services::{WebhookHttpResponse, WebhookRequest, WebhookTransport};
use shared::crypto::SIGNATURE_HEADER;

use crate::config::WebhookConfig;

/// Sends webhooks with reqwest.
///
/// A client is built per request so the connection can be pinned to the
/// addresses the URL validator approved. Redirects are never followed.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    timeout: Duration,
    user_agent: String,
    max_body_bytes: usize,
}

impl ReqwestTransport {
    pub fn new(config: &WebhookConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.request_timeout_ms),
            user_agent: config.user_agent.clone(),
            max_body_bytes: config.max_response_body_bytes,
        }
    }

    fn client_for(&self, request: &WebhookRequest) -> Result<Client, TransportError> {
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .redirect(redirect::Policy::none())
            .user_agent(self.user_agent.as_str());

        if let Some(domain) = request.url.domain() {
            if !request.resolved_addrs.is_empty() {
                builder = builder.resolve_to_addrs(domain, &request.resolved_addrs);
            }
        }

        builder
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))
    }

    fn map_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if err.is_connect() || err.is_request() || err.is_body() {
            TransportError::Connection(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }

    /// Read at most `max_body_bytes` of the response body.
    async fn read_body(&self, mut response: reqwest::Response) -> String {
        let mut body = Vec::new();
        while body.len() < self.max_body_bytes {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let room = self.max_body_bytes - body.len();
                    body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "Failed reading webhook response body");
                    break;
                }
            }
        }
        String::from_utf8_lossy(&body).into_owned()
    }
}

#[async_trait::async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post(&self, request: WebhookRequest) -> Result<WebhookHttpResponse, TransportError> {
        let client = self.client_for(&request)?;

        let response = client
            .post(request.url.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, request.signature)
            .body(request.body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let body = self.read_body(response).await;

        Ok(WebhookHttpResponse { status, body })
    }
}
