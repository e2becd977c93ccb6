//! HTTP Status Code Matching Utilities
//!
//! Matches probe response codes against configured patterns, supporting
//! wildcard patterns like "2xx" next to exact codes like "206".

use reqwest::StatusCode;

/// Check if a status code matches any of the acceptable status code patterns
pub fn is_status_acceptable(status: &StatusCode, acceptable_codes: &[String]) -> bool {
    let status_code = status.as_u16();
    acceptable_codes
        .iter()
        .any(|pattern| matches_pattern(status_code, pattern))
}

/// Check if a status code matches a specific pattern
fn matches_pattern(status_code: u16, pattern: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    if let Some(prefix) = pattern.strip_suffix("xx") {
        if prefix.len() == 1
            && let Ok(prefix_digit) = prefix.parse::<u16>()
        {
            return status_code / 100 == prefix_digit;
        }
        return false;
    }

    pattern
        .parse::<u16>()
        .map(|exact| exact == status_code)
        .unwrap_or(false)
}

/// Servers that answer HEAD with these codes usually serve GET fine
pub fn is_head_rejection(status: &StatusCode) -> bool {
    matches!(
        *status,
        StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
    )
}
