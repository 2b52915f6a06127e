//! The HTTP seam under the evasion layer.
//!
//! [`Transport`] sends exactly one request through one identity and reports
//! what came back. Retries, rotation and backoff live above it in
//! [`super::EvasionLayer`]. Tests swap in [`crate::testing::MockTransport`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;
use url::Url;

use crate::error::TransportError;
use crate::secret::SecretString;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: SecretString,
}

/// One egress proxy.
#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    /// `scheme://host:port`, without credentials
    pub address: String,
    pub credentials: Option<ProxyCredentials>,
}

impl ProxyEndpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credentials: None,
        }
    }

    /// Parse `scheme://[user:pass@]host:port`. Credentials are split out of the address.
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let mut url = Url::parse(raw.trim())
            .map_err(|e| TransportError::Other(format!("invalid proxy URL: {}", e)))?;
        if url.host_str().is_none() {
            return Err(TransportError::Other(format!(
                "proxy URL has no host: {}",
                raw
            )));
        }

        let credentials = if url.username().is_empty() {
            None
        } else {
            Some(ProxyCredentials {
                username: url.username().to_string(),
                password: SecretString::new(url.password().unwrap_or_default()),
            })
        };
        // Url setters only fail for cannot-be-a-base URLs, which have no host
        let _ = url.set_username("");
        let _ = url.set_password(None);

        Ok(Self {
            address: url.as_str().trim_end_matches('/').to_string(),
            credentials,
        })
    }
}

/// A fully resolved request: identity already chosen.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
    /// None means a direct connection
    pub proxy: Option<ProxyEndpoint>,
    pub user_agent: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub final_url: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            final_url: String::new(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<RawResponse, TransportError>;

    /// Release pooled connections. Called once during shutdown.
    async fn close(&self) {}
}

const DIRECT_KEY: &str = "direct";

/// reqwest-backed transport with one cached client per proxy.
pub struct ReqwestTransport {
    clients: DashMap<String, reqwest::Client>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    fn browser_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );
        headers.insert(
            reqwest::header::UPGRADE_INSECURE_REQUESTS,
            HeaderValue::from_static("1"),
        );
        headers
    }

    fn client_for(&self, proxy: Option<&ProxyEndpoint>) -> Result<reqwest::Client, TransportError> {
        let key = proxy.map(|p| p.address.as_str()).unwrap_or(DIRECT_KEY);
        if let Some(client) = self.clients.get(key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder()
            .default_headers(Self::browser_headers())
            .redirect(reqwest::redirect::Policy::limited(5));

        builder = match proxy {
            Some(endpoint) => {
                let mut proxy = reqwest::Proxy::all(&endpoint.address)
                    .map_err(|e| TransportError::Other(format!("invalid proxy: {}", e)))?;
                if let Some(creds) = &endpoint.credentials {
                    proxy = proxy.basic_auth(&creds.username, creds.password.expose());
                }
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {}", e)))?;
        debug!(identity = %key, "Created HTTP client");
        self.clients.insert(key.to_string(), client.clone());
        Ok(client)
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<RawResponse, TransportError> {
        let client = self.client_for(request.proxy.as_ref())?;

        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Post => client.post(&request.url),
        }
        .timeout(request.timeout)
        .header(reqwest::header::USER_AGENT, request.user_agent.as_str());

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Other(format!("invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Other(format!("invalid header value: {}", e)))?;
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(RawResponse {
            status,
            body,
            final_url,
        })
    }

    async fn close(&self) {
        self.clients.clear();
    }
}
