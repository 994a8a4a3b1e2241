use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client as ReqwestClient, Method};
use sgsync_core::Transport;
use sgsync_domain::{
    ApiConfig, HttpMethod, RawResponse, SgsyncError, TransportError, DEFAULT_BASE_URL,
};
use tracing::{debug, instrument};
use url::Url;

use crate::errors::{InfraError, IntoTransportError};

const DEFAULT_USER_AGENT: &str = concat!("sgsync/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed [`Transport`]. Every HTTP status comes back as a
/// [`RawResponse`]; retry policy belongs to the caller.
#[derive(Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
    base_url: String,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Start building a new transport.
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    /// Build a transport from the `[api]` config section.
    ///
    /// # Errors
    /// Returns `SgsyncError::Config` if the base URL or key cannot be used.
    pub fn from_config(config: &ApiConfig) -> Result<Self, SgsyncError> {
        let mut builder = Self::builder()
            .base_url(&config.base_url)
            .api_key(&config.api_key)
            .timeout(config.request_timeout());
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent);
        }
        builder.build()
    }

    /// API root without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn to_reqwest(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, method, body), fields(method = %method))]
    async fn issue_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<RawResponse, TransportError> {
        let mut request = self.client.request(to_reqwest(method), self.url_for(path));
        if let Some(body) = &body {
            request = request.json(body);
        }

        debug!("sending HTTP request");
        let response = request.send().await.map_err(IntoTransportError::into_transport)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(IntoTransportError::into_transport)?;
        debug!(status, bytes = text.len(), "received HTTP response");

        Ok(RawResponse::new(status, text))
    }
}

/// Builder for [`HttpTransport`].
pub struct HttpTransportBuilder {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    user_agent: Option<String>,
}

impl fmt::Debug for HttpTransportBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransportBuilder")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

impl HttpTransportBuilder {
    /// API root; defaults to the public endpoint.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sent as a bearer token on every request.
    #[must_use]
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Per-request timeout. Distinct from the retry budget of a lifecycle
    /// call.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides `sgsync/<version>`.
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// # Errors
    /// Returns `SgsyncError::Config` for a missing key, an unparsable base
    /// URL, or a key that is not a valid header value.
    pub fn build(self) -> Result<HttpTransport, SgsyncError> {
        let api_key = self
            .api_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| SgsyncError::Config("api key is required".to_string()))?;

        let base_url = Url::parse(&self.base_url).map_err(|e| {
            SgsyncError::Config(format!("Invalid base url '{}': {}", self.base_url, e))
        })?;

        let mut authorization = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
            SgsyncError::Config("api key contains characters not allowed in a header".to_string())
        })?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = ReqwestClient::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT))
            .default_headers(headers)
            .no_proxy()
            .build()
            .map_err(|err| SgsyncError::from(InfraError::from(err)))?;

        Ok(HttpTransport {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        })
    }
}
