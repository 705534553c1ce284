//! Shared utilities for download integration tests.
//!
//! [`ScriptedSession`] replays a fixed list of responses (or transport
//! errors) in order and records every request it receives, together with
//! the tokio instant it arrived at, so retry and backoff behavior can be
//! asserted on a paused clock.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use mediafetch_core::download::{
    FileDestination, HttpRequest, HttpResponse, HttpSession, TransportError,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use tokio::time::Instant;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// A response head followed by the given body chunks.
    Response {
        status: u16,
        headers: Vec<(String, String)>,
        chunks: Vec<Result<Bytes, TransportError>>,
        redirect: Option<String>,
    },
    /// No response at all.
    Error(TransportError),
}

impl Scripted {
    /// A response with `status` and an empty body.
    pub fn status(status: u16) -> Self {
        Self::Response {
            status,
            headers: Vec::new(),
            chunks: Vec::new(),
            redirect: None,
        }
    }

    /// A 200 response carrying `body` with a matching `Content-Length`.
    pub fn ok(body: &[u8]) -> Self {
        Self::status(200)
            .header("content-length", body.len().to_string())
            .body(body)
    }

    /// A transport failure before any response head.
    pub fn error(error: TransportError) -> Self {
        Self::Error(error)
    }

    /// Adds a response header.
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        if let Self::Response { headers, .. } = &mut self {
            headers.push((name.to_string(), value.into()));
        }
        self
    }

    /// Replaces the body with a single chunk.
    #[must_use]
    pub fn body(self, body: &[u8]) -> Self {
        self.chunks(vec![Ok(Bytes::copy_from_slice(body))])
    }

    /// Replaces the body with the given chunks.
    #[must_use]
    pub fn chunks(mut self, body: Vec<Result<Bytes, TransportError>>) -> Self {
        if let Self::Response { chunks, .. } = &mut self {
            *chunks = body;
        }
        self
    }

    /// Marks the response as served from `url` after a redirect.
    #[must_use]
    pub fn redirected_to(mut self, url: &str) -> Self {
        if let Self::Response { redirect, .. } = &mut self {
            *redirect = Some(url.to_string());
        }
        self
    }
}

/// A request as seen by the session.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub url: String,
    pub method: String,
    pub range: Option<String>,
    pub at: Instant,
}

/// Session replaying [`Scripted`] replies in order.
///
/// Once the script runs out, the fallback reply (if any) repeats forever;
/// without one the session reports a connection error.
#[derive(Debug, Default)]
pub struct ScriptedSession {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<Scripted>,
    requests: Mutex<Vec<Recorded>>,
    body_reads: Arc<AtomicUsize>,
}

impl ScriptedSession {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    pub fn repeating(reply: Scripted) -> Arc<Self> {
        Arc::new(Self {
            fallback: Some(reply),
            ..Self::default()
        })
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of body chunks handed to the downloader so far.
    pub fn body_reads(&self) -> usize {
        self.body_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpSession for ScriptedSession {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(Recorded {
            url: request.url.clone(),
            method: request.method.to_string(),
            range: request
                .headers
                .get("range")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            at: Instant::now(),
        });

        let next = self.script.lock().unwrap().pop_front();
        let reply = next
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Scripted::error(TransportError::connect("script exhausted")));

        match reply {
            Scripted::Error(error) => Err(error),
            Scripted::Response {
                status,
                headers,
                chunks,
                redirect,
            } => {
                let mut map = HeaderMap::new();
                for (name, value) in headers {
                    map.append(
                        HeaderName::from_bytes(name.as_bytes()).unwrap(),
                        HeaderValue::from_str(&value).unwrap(),
                    );
                }
                let reads = Arc::clone(&self.body_reads);
                let body = stream::iter(chunks)
                    .inspect(move |_| {
                        reads.fetch_add(1, Ordering::SeqCst);
                    })
                    .boxed();
                let response = HttpResponse::new(status, map, request.url, body);
                Ok(match redirect {
                    Some(url) => response.with_redirect(url),
                    None => response,
                })
            }
        }
    }
}

/// A destination named `{filename}.{extension}` in `directory`.
pub fn destination(directory: &Path, filename: &str, extension: &str) -> FileDestination {
    let mut metadata = Map::new();
    metadata.insert("filename".into(), Value::String(filename.into()));
    metadata.insert("extension".into(), Value::String(extension.into()));
    FileDestination::new(directory, "{filename}.{extension}", metadata)
}

/// `len` bytes of a repeating, signature-free pattern.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 200) as u8 + 32).collect()
}

/// A minimal PNG header followed by `len` filler bytes.
pub fn png(len: usize) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec();
    data.extend(std::iter::repeat_n(0_u8, len));
    data
}
