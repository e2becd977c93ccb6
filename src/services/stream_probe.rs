//! Single-URL reachability probes
//!
//! [`StreamProbe`] is the seam between validation logic and the network.
//! [`HttpStreamProbe`] sends a `HEAD` and, when a server refuses `HEAD`,
//! one ranged `GET` for the first byte. The body is never read.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, header, redirect};
use std::error::Error as StdError;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use url::Url;

use crate::config::HttpProbeConfig;
use crate::errors::{ValidationError, ValidationResult};
use crate::utils::status_code_matcher::{is_head_rejection, is_status_acceptable};
use crate::utils::url::UrlUtils;

/// What a successful probe saw
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub elapsed: Duration,
}

/// One reachability check against one URL
///
/// `Ok` means the stream answered with an acceptable status. Every failure
/// is a [`ValidationError`]; implementations never retry.
#[async_trait]
pub trait StreamProbe: Send + Sync {
    async fn probe(&self, url: &str, timeout: Duration) -> ValidationResult<ProbeResponse>;
}

/// Production probe on reqwest
#[derive(Debug, Clone)]
pub struct HttpStreamProbe {
    client: Client,
    config: HttpProbeConfig,
}

impl HttpStreamProbe {
    pub fn new(config: &HttpProbeConfig) -> ValidationResult<Self> {
        let redirect_policy = if config.follow_redirects {
            redirect::Policy::limited(config.max_redirects)
        } else {
            redirect::Policy::none()
        };

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(redirect_policy)
            .build()
            .map_err(|e| ValidationError::invalid_config("http", e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn send(
        &self,
        method: Method,
        url: &Url,
        timeout: Duration,
    ) -> ValidationResult<reqwest::Response> {
        let mut request = self.client.request(method.clone(), url.clone()).timeout(timeout);
        if method == Method::GET {
            request = request.header(header::RANGE, "bytes=0-0");
        }
        request
            .send()
            .await
            .map_err(|e| map_request_error(url, &e, timeout))
    }
}

#[async_trait]
impl StreamProbe for HttpStreamProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> ValidationResult<ProbeResponse> {
        let parsed = Url::parse(url).map_err(|e| {
            ValidationError::request(format!(
                "invalid stream URL '{}': {e}",
                UrlUtils::obfuscate_credentials(url)
            ))
        })?;

        let started = Instant::now();
        let mut response = self.send(Method::HEAD, &parsed, timeout).await?;

        if is_head_rejection(&response.status()) && self.config.get_fallback_on_head_rejection {
            debug!(
                "HEAD rejected with {} by {}, retrying with ranged GET",
                response.status(),
                UrlUtils::obfuscate_credentials(url)
            );
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(ValidationError::Timeout {
                    url: UrlUtils::obfuscate_credentials(url),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            response = self.send(Method::GET, &parsed, remaining).await?;
        }

        let status = response.status();
        let elapsed = started.elapsed();
        trace!(
            "Probe {} -> {} in {}ms",
            UrlUtils::obfuscate_credentials(url),
            status,
            elapsed.as_millis()
        );

        if status == StatusCode::PROXY_AUTHENTICATION_REQUIRED {
            return Err(ValidationError::Authentication {
                message: format!("proxy returned {} for stream probe", status.as_u16()),
            });
        }
        if !is_status_acceptable(&status, &self.config.acceptable_status_codes) {
            return Err(ValidationError::HttpStatus {
                url: UrlUtils::obfuscate_credentials(url),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(ProbeResponse {
            status: status.as_u16(),
            content_type,
            elapsed,
        })
    }
}

/// Full source chain of an error as one line
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Map a transport failure onto the validation error taxonomy
fn map_request_error(url: &Url, err: &reqwest::Error, timeout: Duration) -> ValidationError {
    let safe_url = UrlUtils::obfuscate_credentials(url.as_str());
    if err.is_timeout() {
        return ValidationError::Timeout {
            url: safe_url,
            timeout_ms: timeout.as_millis() as u64,
        };
    }

    let chain = UrlUtils::obfuscate_credentials(&error_chain(err));
    let lowered = chain.to_lowercase();

    if ["dns error", "failed to lookup address", "name or service not known", "no such host"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        return ValidationError::Dns {
            host: UrlUtils::extract_domain(url.as_str()).unwrap_or_default(),
            message: chain,
        };
    }
    if lowered.contains("connection refused") {
        return ValidationError::ConnectionRefused { url: safe_url };
    }
    if ["certificate", "invalid peer", "tls handshake"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        return ValidationError::Tls { message: chain };
    }
    if err.is_connect() {
        return ValidationError::Unreachable { url: safe_url };
    }
    ValidationError::Request { message: chain }
}
