//! HTTP(S) loader: status mapping and retry.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{is_http_url, ConfigMap, ConfigurationLoader, DocumentFormat};
use crate::canonicalize::MAX_TOTAL_SIZE;
use crate::error::{StateError, StateResult};

/// User agent sent with every request.
pub const USER_AGENT_VALUE: &str = concat!("wgfed-state/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout used when none is configured.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Loads YAML or JSON documents over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpConfigurationLoader {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
    retry_base: Duration,
    max_response_size: usize,
}

impl HttpConfigurationLoader {
    pub fn new(timeout: Duration) -> StateResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| StateError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            timeout,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base: DEFAULT_RETRY_BASE,
            max_response_size: MAX_TOTAL_SIZE,
        })
    }

    /// Retries after the first attempt on network errors, timeouts, 429 and 5xx.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Base of the exponential backoff between retries.
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    /// Largest body accepted, with or without a `Content-Length`.
    pub fn with_max_response_size(mut self, max_response_size: usize) -> Self {
        self.max_response_size = max_response_size;
        self
    }

    async fn fetch(&self, url: &str) -> StateResult<(String, Option<String>)> {
        let mut retries = 0;

        loop {
            match self.fetch_once(url).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;

                    let base_backoff = self
                        .retry_base
                        .saturating_mul(1 << retries.min(16))
                        .min(MAX_BACKOFF);
                    let jittered_ms =
                        rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
                    let backoff = Duration::from_millis(jittered_ms.max(10));

                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One GET; returns the body and its content type.
    async fn fetch_once(&self, url: &str) -> StateResult<(String, Option<String>)> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(StateError::NotFound {
                locator: url.to_string(),
            });
        }
        if !status.is_success() {
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            let message = if retryable {
                String::new()
            } else {
                response.text().await.unwrap_or_default().trim().to_string()
            };
            return Err(StateError::HttpStatus {
                locator: url.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        if let Some(length) = response.content_length() {
            if length > self.max_response_size as u64 {
                return Err(self.too_large(url, length));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.request_error(url, e))?
        {
            if body.len() + chunk.len() > self.max_response_size {
                return Err(self.too_large(url, (body.len() + chunk.len()) as u64));
            }
            body.extend_from_slice(&chunk);
        }

        let body = String::from_utf8(body).map_err(|e| StateError::Parse {
            locator: url.to_string(),
            message: format!("response body is not UTF-8: {}", e),
        })?;

        Ok((body, content_type))
    }

    /// Client timeouts keep their own variant; everything else is a network error.
    fn request_error(&self, url: &str, err: reqwest::Error) -> StateError {
        if err.is_timeout() {
            StateError::Timeout {
                locator: url.to_string(),
                after: self.timeout,
            }
        } else {
            err.into()
        }
    }

    fn too_large(&self, url: &str, size: u64) -> StateError {
        StateError::Parse {
            locator: url.to_string(),
            message: format!(
                "response size {} exceeds limit {}",
                size, self.max_response_size
            ),
        }
    }
}

/// Format from the URL path extension, then the content type, then YAML.
fn detect_format(url: &str, content_type: Option<&str>) -> DocumentFormat {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());

    DocumentFormat::from_locator(&path)
        .or_else(|| {
            content_type
                .filter(|ct| ct.to_ascii_lowercase().contains("json"))
                .map(|_| DocumentFormat::Json)
        })
        .unwrap_or(DocumentFormat::Yaml)
}

#[async_trait]
impl ConfigurationLoader for HttpConfigurationLoader {
    fn supports(&self, source: &str) -> bool {
        is_http_url(source)
    }

    #[instrument(skip_all, fields(source = %source))]
    async fn load(&self, source: &str) -> StateResult<ConfigMap> {
        let (body, content_type) = self.fetch(source).await?;
        let format = detect_format(source, content_type.as_deref());
        debug!(bytes = body.len(), format = ?format, "fetched configuration");
        format.parse(&body, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(
            detect_format("https://hq/state.json?rev=2", None),
            DocumentFormat::Json
        );
        assert_eq!(
            detect_format("https://hq/state", Some("application/json; charset=utf-8")),
            DocumentFormat::Json
        );
        assert_eq!(
            detect_format("https://hq/state.yaml", Some("application/json")),
            DocumentFormat::Yaml
        );
        assert_eq!(
            detect_format("https://hq/state", Some("text/plain")),
            DocumentFormat::Yaml
        );
    }

    #[test]
    fn test_supports_only_http() {
        let loader = HttpConfigurationLoader::new(DEFAULT_HTTP_TIMEOUT).unwrap();
        assert!(loader.supports("https://hq.example.net/state.yaml"));
        assert!(loader.supports("http://10.0.0.1:8080/state"));
        assert!(!loader.supports("/var/lib/state.yaml"));
    }
}
