//! URL utilities for stream validation
//!
//! Scheme downgrade, duplicate detection keys and credential masking for logs.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static SENSITIVE_PARAMS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["username", "password", "user", "pass", "pwd", "passwd", "token"]
        .iter()
        .filter_map(|param| {
            Regex::new(&format!(r"(?i)([?&]{}=)[^&]*", regex::escape(param))).ok()
        })
        .collect()
});

/// URL utilities for consistent URL handling
pub struct UrlUtils;

impl UrlUtils {
    /// Secure schemes and the plain variant they downgrade to
    const DOWNGRADES: &'static [(&'static str, &'static str)] = &[("https", "http")];

    /// Plain-scheme variant of a secure stream URL
    ///
    /// Returns `None` when the URL does not parse, already uses a plain
    /// scheme, or has no known downgrade.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stream_validator::utils::url::UrlUtils;
    ///
    /// assert_eq!(
    ///     UrlUtils::downgrade_scheme("https://ok.example/stream").as_deref(),
    ///     Some("http://ok.example/stream")
    /// );
    /// assert_eq!(UrlUtils::downgrade_scheme("http://ok.example/stream"), None);
    /// ```
    pub fn downgrade_scheme(url: &str) -> Option<String> {
        let trimmed = url.trim();
        let parsed = Url::parse(trimmed).ok()?;
        let (_, target) = Self::DOWNGRADES
            .iter()
            .find(|(secure, _)| *secure == parsed.scheme())?;

        // Url::set_scheme refuses some special-scheme changes, splice the text instead
        let rest = &trimmed[parsed.scheme().len()..];
        let downgraded = format!("{target}{rest}");
        (downgraded != trimmed).then_some(downgraded)
    }

    /// Key under which two stream URLs count as the same stream
    ///
    /// A secure scheme and its plain variant share a key, as do a port and
    /// the scheme's own default port. Host case and a trailing slash are
    /// ignored. Unparseable URLs fall back to their trimmed text.
    pub fn dedup_key(url: &str) -> String {
        let trimmed = url.trim();
        match Url::parse(trimmed) {
            Ok(parsed) if parsed.host_str().is_some() => {
                let scheme = parsed.scheme();
                let family = Self::DOWNGRADES
                    .iter()
                    .find(|(secure, _)| *secure == scheme)
                    .map_or(scheme, |(_, plain)| *plain);
                let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
                // Url::port() is None for the scheme's own default port
                let port = parsed
                    .port()
                    .map(|p| format!(":{p}"))
                    .unwrap_or_default();
                let path = parsed.path().trim_end_matches('/');
                let query = parsed.query().map(|q| format!("?{q}")).unwrap_or_default();
                format!("{family}://{host}{port}{path}{query}")
            }
            _ => trimmed.to_string(),
        }
    }

    /// Extract the host from a URL
    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }

    /// Check if a URL is valid
    pub fn is_valid(url: &str) -> bool {
        Url::parse(url).is_ok()
    }

    /// Obfuscate sensitive information in URLs for safe logging
    ///
    /// Masks user info and credential-like query parameters. Works on any
    /// text, so error messages embedding URLs can be passed through as well.
    pub fn obfuscate_credentials(url: &str) -> String {
        let mut obfuscated = url.to_string();

        if let Ok(parsed) = Url::parse(url)
            && (!parsed.username().is_empty() || parsed.password().is_some())
        {
            let mut new_url = parsed.clone();
            let _ = new_url.set_username("****");
            let _ = new_url.set_password(Some("****"));
            obfuscated = new_url.to_string();
        }

        for re in SENSITIVE_PARAMS.iter() {
            obfuscated = re.replace_all(&obfuscated, "${1}****").to_string();
        }

        obfuscated
    }
}
