//! DS Toolkit HTTP transport.
//!
//! This crate provides the transport collaborator used by remote operations.
//! It focuses on:
//!
//! - A small request/response model independent of the HTTP client
//! - The [`HttpTransport`] trait the engine calls through
//! - A `reqwest`-backed [`ReqwestTransport`] with sensible defaults
//! - Validating server URLs before requests are built against them
//!
//! Tests substitute their own [`HttpTransport`] so no network is touched.

use std::env;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Url, header, multipart};
use tracing::{debug, warn};

mod transport;

pub use reqwest::{Method, StatusCode};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, MultipartValue, RequestBody, TransportError};

/// Environment variable overriding the request timeout in seconds.
pub const TIMEOUT_ENV_VAR: &str = "DSTK_HTTP_TIMEOUT_SECS";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Hostnames allowed to use plain HTTP without a warning.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

#[derive(Debug, Clone)]
/// Thin wrapper around a configured `reqwest::Client`.
///
/// The client pre-configures default headers and a timeout. The timeout is the
/// only cancellation mechanism remote operations have.
pub struct ReqwestTransport {
    pub http: Client,
    pub user_agent: String,
}

impl ReqwestTransport {
    /// Construct a transport with an explicit timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json, */*"));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .context("build http client")?;

        Ok(Self {
            http,
            user_agent: format!("dstk/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
        })
    }

    /// Construct a transport reading the timeout from `DSTK_HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::new(Duration::from_secs(timeout_from_env()?))
    }
}

fn timeout_from_env() -> Result<u64> {
    match env::var(TIMEOUT_ENV_VAR) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|error| anyhow!("{TIMEOUT_ENV_VAR} must be a whole number of seconds, got '{raw}': {error}")),
        Err(_) => Ok(DEFAULT_TIMEOUT_SECS),
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = Url::parse(&request.url).map_err(|error| TransportError::InvalidRequest(format!("{}: {error}", request.url)))?;
        let method = request.method.clone();
        let started_at = Instant::now();
        debug!(method = %method, url = %url, "http request started");

        let mut builder = self
            .http
            .request(request.method, url.clone())
            .header(header::USER_AGENT, &self.user_agent);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Text(text) => builder.body(text),
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)),
        };

        let response = builder
            .send()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_ascii_lowercase(), value.to_str().ok()?.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?
            .to_vec();

        debug!(
            method = %method,
            url = %url,
            status,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "http request completed"
        );
        Ok(HttpResponse { status, headers, body })
    }
}

fn build_form(parts: Vec<(String, MultipartValue)>) -> multipart::Form {
    let mut form = multipart::Form::new();
    for (name, value) in parts {
        form = match value {
            MultipartValue::Text(text) => form.text(name, text),
            MultipartValue::Bytes { file_name, data } => {
                let mut part = multipart::Part::bytes(data);
                if let Some(file_name) = file_name {
                    part = part.file_name(file_name);
                }
                form.part(name, part)
            }
        };
    }
    form
}

/// Validate that a server URL is acceptable for building requests.
///
/// Rules:
/// - the URL must parse and include a host
/// - only `http` and `https` are accepted
/// - plain `http` to anything but `localhost`/`127.0.0.1` is allowed but logged
pub fn validate_base_url(base: &str) -> Result<Url> {
    let parsed_base_url = Url::parse(base).map_err(|e| anyhow!("Invalid server URL '{}': {}", base, e))?;

    let host_name = parsed_base_url
        .host_str()
        .ok_or_else(|| anyhow!("server URL '{}' must include a host", base))?;

    match parsed_base_url.scheme() {
        "https" => {}
        "http" => {
            let is_local = LOCALHOST_DOMAINS
                .iter()
                .any(|&allowed| host_name.eq_ignore_ascii_case(allowed));
            if !is_local {
                warn!(host = %host_name, "server URL uses plain http");
            }
        }
        other => {
            return Err(anyhow!("server URL must use http or https; got '{}://'", other));
        }
    }

    Ok(parsed_base_url)
}
