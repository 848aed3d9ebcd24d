//! # Dhikr Net
//!
//! HTTP implementation of the worker's [`Network`] seam.
//!
//! Bodies are read in full before a [`Response`] is returned, so the worker
//! always deals in owned buffers.

use std::time::Duration;

use async_trait::async_trait;
use dhikr_sw::{Network, Request, Response, SwError};
use http::header::{self, HeaderMap};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<NetError> for SwError {
    fn from(err: NetError) -> Self {
        SwError::NetworkError(err.to_string())
    }
}

/// Drop hop-by-hop headers; they are meaningful for one connection only.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in [
        header::CONNECTION,
        header::TRANSFER_ENCODING,
        header::TE,
        header::TRAILER,
        header::UPGRADE,
        header::PROXY_AUTHORIZATION,
        header::PROXY_AUTHENTICATE,
    ] {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Resource loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Connect timeout. The worker bounds whole attempts itself.
    pub connect_timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("dhikr-host/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: Duration::from_secs(5),
            max_redirects: 10,
        }
    }
}

/// Resource loader for fetching URLs.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    /// Create a new loader.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!("HttpNetwork initialized");
        Ok(Self { client })
    }

    /// Send a request and read the full response.
    pub async fn send(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        let mut headers = request.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        req_builder = req_builder.headers(headers);

        if let Some(body) = &request.body {
            req_builder = req_builder.body(body.clone());
        }

        let response = req_builder.send().await?;
        let status = response.status();
        let mut headers = response.headers().clone();
        strip_hop_by_hop(&mut headers);

        let body = response.bytes().await?;

        trace!(
            url = %request.url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(Response::new(status, headers, body))
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, SwError> {
        Ok(self.send(request).await?)
    }
}
