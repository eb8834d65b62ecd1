// src/services/jwt_service.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::{Error as JwtError, ErrorKind},
};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::jwt::{AccessClaims, RefreshClaims, TokenType};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token invalid")]
    Invalid,

    #[error("token expired")]
    Expired,

    #[error("failed signing token: {0}")]
    Signing(JwtError),
}

impl From<JwtError> for TokenError {
    fn from(err: JwtError) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        }
    }
}

struct Keys {
    enc_key: EncodingKey,
    dec_key: DecodingKey,
}

/// Issues and verifies RS256 tokens. Holds no store handle: verification only
/// needs the public key.
#[derive(Clone)]
pub struct JwtService {
    keys: Arc<Keys>,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, JwtError> {
        let enc_key = EncodingKey::from_rsa_pem(config.private_key.as_bytes())?;
        let dec_key = DecodingKey::from_rsa_pem(config.public_key.as_bytes())?;

        Ok(Self {
            keys: Arc::new(Keys { enc_key, dec_key }),
            issuer: config.issuer.clone(),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /* ---------- ISSUING ---------- */

    #[instrument(skip(self, roles))]
    pub fn issue_access_token(
        &self,
        user_id: &str,
        roles: &[String],
    ) -> Result<(String, AccessClaims), TokenError> {
        let claims = AccessClaims::session(user_id, roles, &self.issuer, self.access_ttl);
        let token = self.create_jwt(&claims)?;
        Ok((token, claims))
    }

    /// Returns the signed token and its opaque id, which the caller persists
    /// so the token can be matched (and rotated) later.
    #[instrument(skip(self))]
    pub fn issue_refresh_token(&self, user_id: &str) -> Result<(String, String), TokenError> {
        let jti = Uuid::new_v4().to_string();
        let claims = RefreshClaims::new(user_id, jti.clone(), &self.issuer, self.refresh_ttl);
        let token = self.create_jwt(&claims)?;
        Ok((token, jti))
    }

    #[instrument(skip(self, roles))]
    pub fn issue_personal_token(
        &self,
        user_id: &str,
        roles: &[String],
        token_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = AccessClaims::personal(user_id, roles, token_id, &self.issuer, expires_at);
        self.create_jwt(&claims)
    }

    /* ---------- VALIDATION ---------- */

    /// Validate a session or personal access token.
    pub fn validate_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims = self.decode_jwt::<AccessClaims>(token)?;

        match claims.token_type {
            TokenType::Session => Ok(claims),
            TokenType::Personal if claims.jti.is_some() => Ok(claims),
            _ => {
                debug!(token_type = claims.token_type.as_str(), "rejected as access token");
                Err(TokenError::Invalid)
            }
        }
    }

    pub fn validate_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims = self.decode_jwt::<RefreshClaims>(token)?;

        if claims.token_type != TokenType::Refresh {
            debug!(token_type = claims.token_type.as_str(), "rejected as refresh token");
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }

    /* ---------- PRIVATE HELPERS ---------- */

    fn create_jwt<T: serde::Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::RS256), claims, &self.keys.enc_key)
            .map_err(TokenError::Signing)
    }

    fn decode_jwt<T: serde::de::DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Ok(decode::<T>(token, &self.keys.dec_key, &validation)?.claims)
    }
}
