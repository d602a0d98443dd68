// SPDX-License-Identifier: MIT
//! Boundary validation for everything that enters the config document.
//!
//! Validators return a specific reason string so gateway handlers and the CLI
//! can surface it verbatim. Nothing that fails validation is ever persisted.

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use crate::error::{KioskError, Result};

/// Longest URL the kiosk will accept.
pub const MAX_URL_LEN: usize = 2048;

/// Display time bounds in seconds.
pub const MIN_DISPLAY_TIME: i64 = 5;
pub const MAX_DISPLAY_TIME: i64 = 86_400;

/// Schemes that must never reach the browser, checked as substrings so that
/// wrapped forms (`http://x/?u=javascript:...` is fine, `javascript:alert(1)`
/// is not) cannot slip through as the outer scheme.
const FORBIDDEN_SCHEMES: &[&str] = &["javascript:", "data:", "file:", "ftp:"];

/// `scheme://host[:port][/path]` with scheme restricted to http/https.
static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[A-Za-z0-9]([A-Za-z0-9.-]*[A-Za-z0-9])?(:\d{1,5})?(/\S*)?$")
        .expect("URL regex is valid")
});

/// Accepted API key: 16-128 chars, alphanumeric/underscore/hyphen.
static API_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{16,128}$").expect("API key regex is valid"));

/// Validate a kiosk URL. Returns the trimmed URL on success.
pub fn validate_url(url: &str) -> Result<&str> {
    let url = url.trim();
    if url.is_empty() {
        return Err(KioskError::validation("url is empty"));
    }
    if url.len() > MAX_URL_LEN {
        return Err(KioskError::validation(format!(
            "url exceeds {MAX_URL_LEN} characters"
        )));
    }
    let lower = url.to_ascii_lowercase();
    for scheme in FORBIDDEN_SCHEMES {
        if lower.starts_with(scheme) {
            return Err(KioskError::validation(format!(
                "forbidden scheme '{scheme}'"
            )));
        }
    }
    if !URL_RE.is_match(url) {
        return Err(KioskError::validation(
            "url must match http(s)://host[:port][/path]",
        ));
    }
    Ok(url)
}

/// Validate a display time in seconds, `[5, 86400]`.
pub fn validate_display_time(secs: i64) -> Result<u64> {
    if !(MIN_DISPLAY_TIME..=MAX_DISPLAY_TIME).contains(&secs) {
        return Err(KioskError::validation(format!(
            "display time {secs}s outside [{MIN_DISPLAY_TIME}, {MAX_DISPLAY_TIME}]"
        )));
    }
    Ok(secs as u64)
}

/// Validate an API key format.
pub fn validate_api_key(key: &str) -> Result<()> {
    if API_KEY_RE.is_match(key) {
        Ok(())
    } else {
        Err(KioskError::validation(
            "api key must be 16-128 alphanumeric/underscore/hyphen characters",
        ))
    }
}

/// Generate a fresh 32-character API key.
pub fn generate_api_key() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Derive a playlist entry title from the URL host when none is given.
///
/// `http://dash.example.com:8080/x` becomes `dash.example.com`.
pub fn derive_title(url: &str) -> String {
    let stripped = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = stripped
        .split('/')
        .next()
        .unwrap_or(stripped)
        .split(':')
        .next()
        .unwrap_or(stripped);
    if host.is_empty() {
        url.to_string()
    } else {
        host.to_string()
    }
}
