//! Minimal HTTP GET abstraction used by every download backend.
//!
//! Backends only ever issue GET requests and always need the full body, so the
//! seam is a single async method returning status, headers and bytes. The
//! production implementation is [`ReqwestTransport`]; tests substitute a fake
//! that serves canned responses and counts calls.
//!
//! No retries happen at this layer or above it. A failed request surfaces as
//! [`IacpmError::Transport`], a non-2xx answer as a normal [`HttpResponse`] for
//! the backend to interpret.

use crate::constants::default_http_timeout;
use crate::core::IacpmError;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// An outgoing GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Value of the first header named `name` (case-insensitive).
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A complete response. Header names are lowercased.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Size hint from `Content-Length`, falling back to the body length.
    #[must_use]
    pub fn content_length(&self) -> u64 {
        self.header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.body.len() as u64)
    }

    /// Deserializes a JSON body.
    pub fn json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            IacpmError::Transport {
                url: url.to_string(),
                reason: format!("invalid JSON response: {e}"),
            }
            .into()
        })
    }

    /// Turns a non-2xx response into [`IacpmError::HttpStatus`] carrying the body.
    pub fn error_for_status(self, url: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(IacpmError::HttpStatus {
                status: self.status,
                url: url.to_string(),
                body: self.text(),
            }
            .into())
        }
    }
}

/// Mutates outgoing requests, e.g. to attach credentials.
pub type RequestHook = Arc<dyn Fn(&mut HttpRequest) + Send + Sync>;

/// Applies `hooks` to `request` in order.
pub fn apply_hooks(request: &mut HttpRequest, hooks: &[RequestHook]) {
    for hook in hooks {
        hook(request);
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpTransport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("iacpm/", env!("CARGO_PKG_VERSION")))
            .timeout(default_http_timeout())
            .build()
            .map_err(|e| IacpmError::Other {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse> {
        tracing::debug!(url = %request.url, "GET");
        let transport_error = |e: reqwest::Error| IacpmError::Transport {
            url: request.url.clone(),
            reason: e.to_string(),
        };

        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(transport_error)?.to_vec();

        tracing::debug!(url = %request.url, status, bytes = body.len(), "Response");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
