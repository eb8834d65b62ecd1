use axum::http::{HeaderMap, header};
use cookie::Cookie;

use crate::config::CookieConfig;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Header,
    Cookie,
}

#[derive(Debug, Clone)]
pub struct ResolvedToken {
    pub token: String,
    pub source: TokenSource,
}

/// Finds the access token for a request. The `Authorization` header wins
/// over the cookie; `Ok(None)` means the caller presented nothing.
pub fn resolve(headers: &HeaderMap, cookies: &CookieConfig) -> AppResult<Option<ResolvedToken>> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Invalid authorization header".into()))?;

        return Ok(Some(ResolvedToken {
            token: token.to_string(),
            source: TokenSource::Header,
        }));
    }

    if !cookies.enabled {
        return Ok(None);
    }

    Ok(cookie_value(headers, &cookies.access_token_name)
        .filter(|v| !v.is_empty())
        .map(|token| ResolvedToken {
            token,
            source: TokenSource::Cookie,
        }))
}

/// Reads a cookie straight off the request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|v| Cookie::split_parse(v))
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}
