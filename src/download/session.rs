//! HTTP session abstraction and the reqwest-backed implementation.
//!
//! The state machine talks to the network only through [`HttpSession`]. A
//! session issues one streaming request and returns the status, headers,
//! final URL, and a lazily-read body. Connection pooling, TLS, proxies, and
//! timeouts belong to the session; the production [`ReqwestSession`] takes
//! them from [`HttpSettings`].

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind, set_hook, take_hook};
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use reqwest::{Client, ClientBuilder, Method, Proxy};
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::CONNECT_TIMEOUT_SECS;
use super::error::{DownloadError, TransportError};
use super::settings::HttpSettings;
use crate::user_agent;

/// Lazily-read response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// One outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Target URL.
    pub url: String,
    /// Fully merged request headers.
    pub headers: HeaderMap,
    /// Optional request body.
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Creates a GET request without headers.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

/// A response whose body has not been read yet.
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Reason phrase, empty when unknown.
    pub reason: String,
    /// Response headers.
    pub headers: HeaderMap,
    /// URL the response was served from after redirects.
    pub url: String,
    /// True when at least one redirect was followed.
    pub redirected: bool,
    body: ByteStream,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("url", &self.url)
            .field("redirected", &self.redirected)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    /// Creates a response served from `url` without redirects.
    pub fn new(status: u16, headers: HeaderMap, url: impl Into<String>, body: ByteStream) -> Self {
        Self {
            status,
            reason: canonical_reason(status),
            headers,
            url: url.into(),
            redirected: false,
            body,
        }
    }

    /// Marks the response as the result of a redirect chain ending at `url`.
    #[must_use]
    pub fn with_redirect(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self.redirected = true;
        self
    }

    /// Returns a header value as text, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// The `Content-Length` header, parsed.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.header(CONTENT_LENGTH.as_str())
            .and_then(|value| value.trim().parse().ok())
    }

    /// Takes the body stream.
    #[must_use]
    pub fn into_body(self) -> ByteStream {
        self.body
    }

    /// Releases the response.
    ///
    /// With `consume` the body is read to the end first so the connection can
    /// go back to the pool; otherwise the response is dropped, which closes it.
    pub async fn release(self, consume: bool) {
        if !consume {
            return;
        }
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            if let Err(error) = chunk {
                debug!(%error, "failed to drain response body");
                return;
            }
        }
    }
}

fn canonical_reason(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("")
        .to_string()
}

/// Issues streaming HTTP requests.
#[async_trait]
pub trait HttpSession: Send + Sync {
    /// Sends `request` and returns once the response head is available.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no response head was received.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production session backed by a pooled reqwest client.
///
/// This client is designed to be created once and reused for multiple
/// downloads, taking advantage of connection pooling.
#[derive(Debug, Clone)]
pub struct ReqwestSession {
    client: Client,
}

impl ReqwestSession {
    /// Builds a session honoring the proxy, TLS, and timeout settings.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Client`] when the client cannot be built, for
    /// example because the proxy URL is malformed.
    #[instrument(level = "debug", skip(settings))]
    pub fn new(settings: &HttpSettings) -> Result<Self, DownloadError> {
        let client = build_client(settings).map_err(DownloadError::client)?;
        Ok(Self { client })
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl HttpSession for ReqwestSession {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let requested = Url::parse(&request.url).ok();
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| TransportError::from_reqwest(&error))?;

        let status = response.status();
        let final_url = response.url().clone();
        let redirected = requested.is_some_and(|requested| requested != final_url);
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|error| TransportError::from_reqwest(&error)))
            .boxed();

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            url: final_url.to_string(),
            redirected,
            body,
        })
    }
}

fn build_client(settings: &HttpSettings) -> Result<Client, reqwest::Error> {
    match try_build_client(settings, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            warn!(
                "HTTP client builder panicked while loading system proxy settings; retrying with env-proxy fallback"
            );
            match try_build_client(settings, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Build(error)) => Err(error),
                Err(BuildClientFailure::Panic) => {
                    panic!("HTTP client builder panicked while applying env-proxy fallback")
                }
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(error),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

// `catch_unwind` does not suppress panic-hook stderr output, so the hook is
// silenced while a guarded build runs.
static CLIENT_BUILD_PANIC_HOOK_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn try_build_client(
    settings: &HttpSettings,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind_silent(AssertUnwindSafe(move || {
        let mut builder = base_client_builder(settings);
        if settings.proxy.is_none() && disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn catch_unwind_silent<F, T>(operation: F) -> Result<T, Box<dyn std::any::Any + Send + 'static>>
where
    F: FnOnce() -> T + std::panic::UnwindSafe,
{
    let _panic_hook_guard = CLIENT_BUILD_PANIC_HOOK_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let previous_hook = take_hook();
    set_hook(Box::new(|_| {}));
    let outcome = catch_unwind(operation);
    set_hook(previous_hook);
    outcome
}

fn base_client_builder(settings: &HttpSettings) -> ClientBuilder {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(settings.timeout))
        .read_timeout(settings.timeout)
        .gzip(true)
        .cookie_store(true)
        .user_agent(user_agent::default_user_agent());
    if !settings.verify {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(proxy) = settings.proxy.as_deref() {
        match Proxy::all(proxy) {
            Ok(resolved) => builder = builder.proxy(resolved),
            Err(error) => warn!(proxy, %error, "ignoring invalid proxy URL"),
        }
    }
    builder
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
