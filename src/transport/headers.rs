//! Request header construction
//!
//! Default headers are merged with per-request headers (per-request wins),
//! `${NAME}` templates are expanded from the environment, and a bearer token
//! is attached for the GitHub API host.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::transport::error::TransportError;

static ENV_TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env template regex is valid")
});

/// Replace every `${NAME}` with the value of the environment variable `NAME`.
///
/// Unset variables expand to an empty string.
pub fn expand_env(value: &str) -> String {
    ENV_TEMPLATE
        .replace_all(value, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

fn insert(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), TransportError> {
    let header_name =
        HeaderName::from_bytes(name.as_bytes()).map_err(|e| TransportError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    let header_value = HeaderValue::from_str(&expand_env(value)).map_err(|e| {
        TransportError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        }
    })?;
    headers.insert(header_name, header_value);
    Ok(())
}

/// Merge default and per-request headers, expanding environment templates.
pub fn merge_headers(
    defaults: &HashMap<String, String>,
    per_request: &HashMap<String, String>,
) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    for (name, value) in defaults {
        insert(&mut headers, name, value)?;
    }
    for (name, value) in per_request {
        insert(&mut headers, name, value)?;
    }
    Ok(headers)
}

/// Attach `Authorization: Bearer <token>` when `host` is the GitHub API host
/// and no authorization header is present.
pub fn apply_github_token(
    headers: &mut HeaderMap,
    host: &str,
    api_host: &str,
    token: Option<&str>,
) -> Result<(), TransportError> {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return Ok(());
    };
    if !host.eq_ignore_ascii_case(api_host) || headers.contains_key(AUTHORIZATION) {
        return Ok(());
    }

    let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
        TransportError::InvalidHeader {
            name: AUTHORIZATION.to_string(),
            reason: e.to_string(),
        }
    })?;
    headers.insert(AUTHORIZATION, value);
    Ok(())
}
