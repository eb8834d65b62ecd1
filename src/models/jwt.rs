// src/models/jwt.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived access token issued by login/refresh.
    Session,
    /// Long-lived access token created explicitly by a user.
    Personal,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Session => "session",
            TokenType::Personal => "personal",
            TokenType::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String, // user id
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>, // personal token id
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String, // matched against the user's current refresh token id
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub refresh_token: String,
    pub token_type: String,
}

impl AccessClaims {
    pub fn session(user_id: &str, roles: &[String], issuer: &str, ttl: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id.to_string(),
            iss: issuer.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: None,
            roles: roles.to_vec(),
            token_type: TokenType::Session,
        }
    }

    pub fn personal(
        user_id: &str,
        roles: &[String],
        token_id: &str,
        issuer: &str,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sub: user_id.to_string(),
            iss: issuer.to_string(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
            jti: Some(token_id.to_string()),
            roles: roles.to_vec(),
            token_type: TokenType::Personal,
        }
    }
}

impl RefreshClaims {
    pub fn new(user_id: &str, jti: String, issuer: &str, ttl: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id.to_string(),
            iss: issuer.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti,
            token_type: TokenType::Refresh,
        }
    }
}
