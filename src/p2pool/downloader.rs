//! Release archive download
//!
//! Fetches the p2pool archive over HTTPS. Redirects are handled by hand so
//! that exactly one `302` hop is followed; chained redirects are not
//! supported and end the download as a connection issue.

use crate::error::{DownloadFailureReason, TransportError};
use async_trait::async_trait;
use futures_util::StreamExt;
use rand::Rng;
use reqwest::header::{LOCATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use url::Url;

/// Default connect and per-read timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for trusting Content-Length when sizing the body buffer
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Browser user agents; one is picked at random per download
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.67",
];

/// Pick a random browser User-Agent string
pub fn random_user_agent() -> &'static str {
    let index = rand::rng().random_range(0..USER_AGENTS.len());
    USER_AGENTS[index]
}

/// Raw HTTP response as seen by the fetcher
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Value of the `Location` header, if any
    pub location: Option<String>,
    pub body: Vec<u8>,
}

/// Minimal HTTP GET capability, swappable for tests
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &Url, user_agent: &str) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by reqwest
///
/// Automatic redirects are disabled; [`fetch_archive`] follows the single hop
/// it allows itself.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// `timeout` bounds connecting and each read, not the whole transfer,
    /// so a slow but steady archive download is not cut off
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::new(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

fn transport_error(context: &str, e: reqwest::Error) -> TransportError {
    let message = format!("{}: {}", context, e);
    if e.is_timeout() {
        TransportError::timeout(message)
    } else {
        TransportError::new(message)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &Url, user_agent: &str) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, user_agent)
            .send()
            .await
            .map_err(|e| transport_error("Request failed", e))?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let total_size = response.content_length().unwrap_or(0);

        let mut body = Vec::with_capacity(total_size.min(MAX_PREALLOC) as usize);
        let mut stream = response.bytes_stream();
        let start_time = Instant::now();
        let mut last_log = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error("Download error", e))?;
            body.extend_from_slice(&chunk);

            if last_log.elapsed().as_secs() >= 2 {
                log::debug!(
                    "Downloaded {}/{} bytes in {:.1}s",
                    body.len(),
                    total_size,
                    start_time.elapsed().as_secs_f64()
                );
                last_log = Instant::now();
            }
        }

        Ok(HttpResponse {
            status,
            location,
            body,
        })
    }
}

/// Successfully fetched archive
#[derive(Debug, Clone)]
pub struct FetchedArchive {
    /// Final status code (after at most one redirect)
    pub status: u16,
    pub body: Vec<u8>,
}

async fn get_once<T: HttpTransport + ?Sized>(
    transport: &T,
    url: &Url,
    user_agent: &str,
) -> Result<HttpResponse, DownloadFailureReason> {
    transport.get(url, user_agent).await.map_err(|e| {
        if e.timed_out {
            log::warn!("Download of {} timed out: {}", url, e);
        } else {
            log::warn!("Download of {} failed: {}", url, e);
        }
        DownloadFailureReason::ConnectionIssue
    })
}

/// Download the archive at `url`, following at most one redirect
pub async fn fetch_archive<T: HttpTransport + ?Sized>(
    transport: &T,
    url: &Url,
) -> Result<FetchedArchive, DownloadFailureReason> {
    let user_agent = random_user_agent();

    log::info!("Downloading {}", url);

    let mut response = get_once(transport, url, user_agent).await?;

    if response.status == StatusCode::FOUND.as_u16() {
        let location = response.location.take().ok_or_else(|| {
            log::warn!("Redirect from {} without Location header", url);
            DownloadFailureReason::ConnectionIssue
        })?;

        // Url::join percent-encodes the query and resolves relative locations
        let redirected = url.join(&location).map_err(|e| {
            log::warn!("Invalid redirect location {:?}: {}", location, e);
            DownloadFailureReason::ConnectionIssue
        })?;

        log::info!("Following redirect to {}", redirected.host_str().unwrap_or(""));
        response = get_once(transport, &redirected, user_agent).await?;
    }

    match response.status {
        404 => {
            log::warn!("Release archive not found upstream: {}", url);
            Err(DownloadFailureReason::BinaryNotAvailable)
        }
        status if (200..300).contains(&status) => {
            log::info!("Download complete: {} bytes", response.body.len());
            Ok(FetchedArchive {
                status,
                body: response.body,
            })
        }
        status => {
            log::warn!("Download failed with status {}", status);
            Err(DownloadFailureReason::ConnectionIssue)
        }
    }
}
