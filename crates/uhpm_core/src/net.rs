//! Blocking HTTP transport with retry, exponential backoff, timeout and gzip.
//!
//! # Invariants
//! - 4xx responses fail immediately; 404 maps to `NetError::NotFound`.
//! - 5xx responses and transport failures are retried up to `max_retries`.

use crate::config::RepositoryAuth;
use crate::model::file_metadata::compute_checksum;
use crate::model::package::Checksum;
use log::{debug, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Read;
use std::time::Duration;

const DOWNLOAD_CHUNK_BYTES: usize = 64 * 1024;
/// Upper bound for trusting `Content-Length` when sizing the body buffer.
const MAX_PREALLOCATED_BYTES: u64 = 8 * 1024 * 1024;

pub type NetResult<T> = Result<T, NetError>;

/// Download progress callback: `(downloaded, total)`.
pub type ProgressFn<'a> = &'a mut dyn FnMut(u64, Option<u64>);

#[derive(Debug)]
pub enum NetError {
    NotFound(String),
    Http { url: String, status: u16 },
    Transport { url: String, message: String },
    RetriesExhausted { url: String, attempts: u32, last_error: String },
    ChecksumMismatch { url: String, expected: String, actual: String },
    UnsupportedChecksum(String),
    Client(String),
}

impl Display for NetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(url) => write!(f, "not found: {url}"),
            Self::Http { url, status } => write!(f, "HTTP {status} from {url}"),
            Self::Transport { url, message } => write!(f, "request to {url} failed: {message}"),
            Self::RetriesExhausted {
                url,
                attempts,
                last_error,
            } => write!(f, "all {attempts} attempts for {url} failed: {last_error}"),
            Self::ChecksumMismatch {
                url,
                expected,
                actual,
            } => write!(
                f,
                "checksum mismatch for {url}: expected {expected}, got {actual}"
            ),
            Self::UnsupportedChecksum(algorithm) => {
                write!(f, "unsupported checksum algorithm: {algorithm}")
            }
            Self::Client(message) => write!(f, "failed to build HTTP client: {message}"),
        }
    }
}

impl Error for NetError {}

/// Fetches bytes from URLs.
pub trait Transport {
    fn get(&self, url: &str) -> NetResult<Vec<u8>>;

    fn get_with_progress(&self, url: &str, progress: ProgressFn<'_>) -> NetResult<Vec<u8>> {
        let bytes = self.get(url)?;
        let len = bytes.len() as u64;
        progress(len, Some(len));
        Ok(bytes)
    }

    fn is_url_available(&self, url: &str) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn get(&self, url: &str) -> NetResult<Vec<u8>> {
        (**self).get(url)
    }

    fn get_with_progress(&self, url: &str, progress: ProgressFn<'_>) -> NetResult<Vec<u8>> {
        (**self).get_with_progress(url, progress)
    }

    fn is_url_available(&self, url: &str) -> bool {
        (**self).is_url_available(url)
    }
}

/// Configuration for the HTTP transport layer.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    /// Doubles after each failed attempt.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub auth: Option<RepositoryAuth>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            auth: None,
        }
    }
}

#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> NetResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .gzip(true)
            .user_agent(concat!("uhpm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| NetError::Client(err.to_string()))?;
        Ok(Self { client, config })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::blocking::RequestBuilder {
        let mut request = self.client.request(method, url);
        if let Some(auth) = &self.config.auth {
            if let Some(token) = &auth.token {
                request = request.bearer_auth(token);
            } else if let Some(username) = &auth.username {
                request = request.basic_auth(username, auth.password.as_deref());
            }
        }
        request
    }

    /// Retry loop shared by every GET; returns the first successful response.
    fn send_with_retry(&self, url: &str) -> NetResult<reqwest::blocking::Response> {
        let mut backoff = self.config.initial_backoff;
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!(
                    "event=http_retry module=net status=start attempt={} max_retries={} backoff_ms={}",
                    attempt,
                    self.config.max_retries,
                    backoff.as_millis()
                );
                std::thread::sleep(backoff);
                backoff = next_backoff(backoff, self.config.max_backoff);
            }

            match self.request(reqwest::Method::GET, url).send() {
                Ok(response) => match classify_status(response.status().as_u16()) {
                    StatusClass::Success => return Ok(response),
                    StatusClass::NotFound => return Err(NetError::NotFound(url.to_string())),
                    StatusClass::Rejected => {
                        return Err(NetError::Http {
                            url: url.to_string(),
                            status: response.status().as_u16(),
                        })
                    }
                    StatusClass::Retry => last_error = format!("HTTP {}", response.status()),
                },
                Err(err) => last_error = err.to_string(),
            }
            warn!(
                "event=http_get module=net status=error attempt={} error={}",
                attempt, last_error
            );
        }

        Err(NetError::RetriesExhausted {
            url: url.to_string(),
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Success,
    NotFound,
    /// Any other 4xx; the request will not succeed on retry.
    Rejected,
    Retry,
}

fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        404 => StatusClass::NotFound,
        400..=499 => StatusClass::Rejected,
        _ => StatusClass::Retry,
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

fn initial_capacity(content_length: Option<u64>) -> usize {
    content_length.unwrap_or(0).min(MAX_PREALLOCATED_BYTES) as usize
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> NetResult<Vec<u8>> {
        let response = self.send_with_retry(url)?;
        let bytes = response.bytes().map_err(|err| NetError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    fn get_with_progress(&self, url: &str, progress: ProgressFn<'_>) -> NetResult<Vec<u8>> {
        let mut response = self.send_with_retry(url)?;
        let total = response.content_length();
        let mut body = Vec::with_capacity(initial_capacity(total));
        let mut chunk = vec![0_u8; DOWNLOAD_CHUNK_BYTES];

        loop {
            let read = response.read(&mut chunk).map_err(|err| NetError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
            progress(body.len() as u64, total);
        }
        Ok(body)
    }

    fn is_url_available(&self, url: &str) -> bool {
        match self.request(reqwest::Method::HEAD, url).send() {
            Ok(response) if response.status().is_success() => true,
            // Some static hosts reject HEAD.
            Ok(response) if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED => self
                .request(reqwest::Method::GET, url)
                .send()
                .map(|response| response.status().is_success())
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Downloads `url` and verifies the bytes against `expected`.
pub fn download_with_checksum(
    transport: &dyn Transport,
    url: &str,
    expected: &Checksum,
    progress: ProgressFn<'_>,
) -> NetResult<Vec<u8>> {
    let bytes = transport.get_with_progress(url, progress)?;
    verify_checksum(url, &bytes, expected)?;
    Ok(bytes)
}

/// Checks `bytes` against `expected`; hash comparison ignores case.
pub fn verify_checksum(url: &str, bytes: &[u8], expected: &Checksum) -> NetResult<()> {
    let actual = compute_checksum(&expected.algorithm, bytes)
        .map_err(|_| NetError::UnsupportedChecksum(expected.algorithm.clone()))?;
    if !actual.eq_ignore_ascii_case(expected.hash.trim()) {
        return Err(NetError::ChecksumMismatch {
            url: url.to_string(),
            expected: expected.hash.clone(),
            actual,
        });
    }
    Ok(())
}
