//! Network access used by the engine.
//!
//! The engine only ever needs two calls, a form POST and a plain GET, both
//! returning the raw body. Hosts with their own HTTP stack implement
//! [`HttpTransport`]; everyone else uses [`ReqwestTransport`].

use crate::errors::{GatewayError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=utf-8";

/// Minimal HTTP capability injected into the engine.
///
/// Any error is fatal for that call; retry and timeout policy belong to the
/// implementation.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POSTs an already url-encoded form body and returns the response body.
    async fn post_form(&self, url: &str, body: &str) -> Result<String>;

    /// GETs `url` and returns the response body.
    async fn get_page(&self, url: &str) -> Result<String>;
}

/// [`HttpTransport`] backed by a shared `reqwest` client.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with a 30 second request timeout.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    /// Wraps a preconfigured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_form(&self, url: &str, body: &str) -> Result<String> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::TransportFailure(format!(
                "gateway returned HTTP {}",
                status.as_u16()
            )));
        }

        let text = response.text().await?;
        debug!(bytes = text.len(), "gateway POST completed");
        Ok(text.trim().to_string())
    }

    async fn get_page(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::TransportFailure(format!(
                "gateway returned HTTP {}",
                status.as_u16()
            )));
        }

        let text = response.text().await?;
        debug!(bytes = text.len(), "gateway GET completed");
        Ok(text.trim().to_string())
    }
}
