// src/services/csrf_service.rs
use std::sync::Arc;

use http::Method;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, crypto};
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::middleware::token_source::TokenSource;

struct MacKeys {
    sign: EncodingKey,
    verify: DecodingKey,
}

/// Double-submit CSRF protection for cookie authenticated requests.
///
/// The token is an HMAC-SHA256 (base64url, unpadded) of the access token
/// cookie value, so it changes whenever the access token does.
#[derive(Clone)]
pub struct CsrfService {
    enabled: bool,
    keys: Arc<MacKeys>,
    header_name: String,
}

impl CsrfService {
    pub fn new(config: &Config) -> Self {
        let secret = config.csrf.secret_key.as_bytes();

        Self {
            enabled: config.cookies.enabled && config.csrf.enabled,
            keys: Arc::new(MacKeys {
                sign: EncodingKey::from_secret(secret),
                verify: DecodingKey::from_secret(secret),
            }),
            header_name: config.csrf.header_name.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Only state-changing requests authenticated by cookie are checked.
    pub fn applies(&self, source: TokenSource, method: &Method) -> bool {
        self.enabled && source == TokenSource::Cookie && !is_safe_method(method)
    }

    pub fn token_for(&self, access_token: &str) -> AppResult<String> {
        crypto::sign(access_token.as_bytes(), &self.keys.sign, Algorithm::HS256)
            .map_err(|e| AppError::Internal(format!("csrf signing: {e}")))
    }

    #[instrument(skip_all)]
    pub fn validate(&self, cookie_value: Option<&str>, header_value: Option<&str>) -> AppResult<()> {
        let cookie_value = cookie_value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing access token cookie".into()))?;
        let header_value = header_value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing CSRF token header".into()))?;

        let valid = crypto::verify(
            header_value,
            cookie_value.as_bytes(),
            &self.keys.verify,
            Algorithm::HS256,
        )
        .unwrap_or(false);

        if !valid {
            debug!("csrf token mismatch");
            return Err(AppError::Forbidden("Invalid CSRF token".into()));
        }
        Ok(())
    }
}

fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}
