//! The HTTP client wrapper: bearer header injection, envelope unwrapping and
//! the one-shot alternate-host fallback. Session recovery lives one layer up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::HttpConfig;
use crate::error::ClientError;
use crate::models::{Envelope, EnvelopeStatus};
use crate::store::TokenStore;
use crate::utils::LogThrottle;

/// Storage flag remembering that the primary host was unreachable.
pub const ALTERNATE_HOST_FLAG: &str = "useAlternateBaseUrl";

/// A request to the backend. Paths are relative to the active base URL
/// unless they are already absolute `http(s)://` URLs.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<Value>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            query: None,
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Picks the base URL for a request. Once the primary host has failed at the
/// transport level the alternate is used for the rest of the session.
pub struct HostSelector {
    primary: String,
    alternate: Option<String>,
    use_alternate: AtomicBool,
}

impl HostSelector {
    pub fn new(primary: &str, alternate: Option<&str>, use_alternate: bool) -> Self {
        let alternate = alternate
            .map(|a| a.trim_end_matches('/').to_string())
            .filter(|a| !a.is_empty());
        HostSelector {
            primary: primary.trim_end_matches('/').to_string(),
            use_alternate: AtomicBool::new(use_alternate && alternate.is_some()),
            alternate,
        }
    }

    pub fn using_alternate(&self) -> bool {
        self.use_alternate.load(Ordering::SeqCst)
    }

    pub fn base_url(&self) -> &str {
        match (&self.alternate, self.using_alternate()) {
            (Some(alternate), true) => alternate,
            _ => &self.primary,
        }
    }

    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url(), path)
        } else {
            format!("{}/{}", self.base_url(), path)
        }
    }

    /// The same URL on the alternate host, if a fallback is still possible for it.
    fn fallback_for(&self, url: &str) -> Option<String> {
        if self.using_alternate() {
            return None;
        }
        let alternate = self.alternate.as_ref()?;
        let rest = url.strip_prefix(self.primary.as_str())?;
        Some(format!("{}{}", alternate, rest))
    }

    fn prefer_alternate(&self) {
        self.use_alternate.store(true, Ordering::SeqCst);
    }
}

/// Sends requests and unwraps envelopes. Never performs session recovery.
pub struct Transport {
    http: reqwest::Client,
    hosts: HostSelector,
    tokens: Arc<TokenStore>,
    throttle: LogThrottle,
}

impl Transport {
    pub fn new(config: &HttpConfig, tokens: Arc<TokenStore>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .cookie_store(config.with_credentials)
            .build()
            .map_err(|source| ClientError::Transport {
                url: config.base_url.clone(),
                source,
            })?;
        let hosts = HostSelector::new(
            &config.base_url,
            config.alternate_base_url.as_deref(),
            tokens.flag(ALTERNATE_HOST_FLAG),
        );
        Ok(Transport {
            http,
            hosts,
            tokens,
            throttle: LogThrottle::default(),
        })
    }

    pub fn hosts(&self) -> &HostSelector {
        &self.hosts
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Sends the request and decodes the `data` of a successful envelope.
    pub async fn send<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ClientError> {
        self.exchange(request).await?.into_data()
    }

    /// Sends the request and returns the raw envelope. HTTP 401 is reported as
    /// `SessionInvalid`, any other non-2xx status as `Http`.
    pub async fn exchange(&self, request: &ApiRequest) -> Result<Envelope, ClientError> {
        let url = self.hosts.resolve(&request.path);
        let request_id = Uuid::new_v4();

        let err = match self.dispatch(request, &url, request_id).await {
            Ok(response) => return self.read_envelope(response, request_id).await,
            Err(err) => err,
        };

        let fallback = if err.is_builder() {
            None
        } else {
            self.hosts.fallback_for(&url)
        };
        let Some(alternate_url) = fallback else {
            if let Some(suppressed) = self.throttle.should_emit(&url) {
                warn!(
                    event_name = "client.transport.failed",
                    event_domain = "client",
                    %request_id,
                    url = url.as_str(),
                    timeout = err.is_timeout(),
                    suppressed_count = suppressed,
                    "request failed without a response: {}",
                    err
                );
            }
            return Err(ClientError::Transport { url, source: err });
        };

        warn!(
            event_name = "client.transport.fallback",
            event_domain = "client",
            %request_id,
            primary = url.as_str(),
            alternate = alternate_url.as_str(),
            "primary host unreachable ({}), retrying once against the alternate host",
            err
        );
        self.hosts.prefer_alternate();
        if let Err(e) = self.tokens.set_flag(ALTERNATE_HOST_FLAG, true) {
            warn!("Could not persist the alternate host preference: {}", e);
        }

        match self.dispatch(request, &alternate_url, request_id).await {
            Ok(response) => self.read_envelope(response, request_id).await,
            Err(source) => Err(ClientError::HostUnreachable {
                primary: url,
                alternate: alternate_url,
                source,
            }),
        }
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        url: &str,
        request_id: Uuid,
    ) -> Result<Response, reqwest::Error> {
        let token = self.tokens.get();
        debug!(
            %request_id,
            method = %request.method,
            url,
            has_token = token.is_some(),
            "sending request"
        );

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, token.bearer());
        }
        if let Some(query) = &request.query {
            builder = builder.query(query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder.send().await
    }

    async fn read_envelope(
        &self,
        response: Response,
        request_id: Uuid,
    ) -> Result<Envelope, ClientError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            debug!(%request_id, "HTTP 401 received");
            return Err(ClientError::SessionInvalid {
                code: i64::from(status.as_u16()),
            });
        }
        if !status.is_success() {
            warn!(%request_id, status = status.as_u16(), "unexpected HTTP status");
            return Err(ClientError::Http {
                status: status.as_u16(),
            });
        }

        let url = response.url().to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ClientError::Transport { url, source })?;
        let envelope: Envelope =
            serde_json::from_slice(&bytes).map_err(|source| ClientError::Serde { source })?;

        match envelope.status() {
            EnvelopeStatus::Success => debug!(%request_id, "request succeeded"),
            EnvelopeStatus::SessionInvalid => {
                debug!(%request_id, code = envelope.code, "session-invalid envelope")
            }
            EnvelopeStatus::Failure => debug!(
                %request_id,
                code = envelope.code,
                msg = envelope.msg.as_deref().unwrap_or(""),
                "business failure"
            ),
        }
        Ok(envelope)
    }
}
