// src/services/oauth2_service.rs
use http::header;
use serde::Deserialize;
use tracing::{info, instrument, warn};
use url::Url;

use crate::config::OAuth2Config;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::user::{NewUser, ROLE_USER, User};

const MAX_USERNAME_ATTEMPTS: u32 = 100;

#[derive(Debug, Deserialize)]
struct ProviderTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Profile fields read from the provider's userinfo endpoint. Covers both
/// GitHub (`login`) and OpenID Connect (`preferred_username`) shapes.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderUser {
    pub email: Option<String>,
    pub login: Option<String>,
    pub preferred_username: Option<String>,
    pub name: Option<String>,
}

/// Authorization code flow against a single configured provider.
#[derive(Clone)]
pub struct OAuth2Service {
    config: OAuth2Config,
    client: reqwest::Client,
}

impl OAuth2Service {
    pub fn new(config: OAuth2Config, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn authorize_url(&self, state: &str) -> AppResult<String> {
        let scope = self.config.scopes.join(" ");
        let url = Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::Internal(format!("oauth2 auth url: {e}")))?;
        Ok(url.into())
    }

    /// Trades the authorization code for a provider access token.
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str) -> AppResult<String> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];

        let resp = self
            .client
            .post(&self.config.token_url)
            .header(header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("oauth2 token exchange: {e}")))?;

        if !resp.status().is_success() {
            warn!(status = %resp.status(), "oauth2 token exchange rejected");
            return Err(AppError::Unauthorized("OAuth2 login failed".into()));
        }

        let body: ProviderTokenResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("oauth2 token response: {e}")))?;

        match body.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => {
                warn!(
                    error = body.error.as_deref().unwrap_or_default(),
                    description = body.error_description.as_deref().unwrap_or_default(),
                    "oauth2 provider returned no access token"
                );
                Err(AppError::Unauthorized("OAuth2 login failed".into()))
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn fetch_user(&self, provider_token: &str) -> AppResult<ProviderUser> {
        let resp = self
            .client
            .get(&self.config.userinfo_url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(provider_token)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("oauth2 userinfo: {e}")))?;

        if !resp.status().is_success() {
            warn!(status = %resp.status(), "oauth2 userinfo rejected");
            return Err(AppError::Unauthorized("OAuth2 login failed".into()));
        }

        resp.json()
            .await
            .map_err(|e| AppError::Internal(format!("oauth2 userinfo response: {e}")))
    }
}

/// Finds the local account for a provider profile by email, creating one
/// (without a password) on first login.
#[instrument(skip_all)]
pub async fn find_or_create_user(db: &Database, profile: &ProviderUser) -> AppResult<User> {
    let email = profile
        .email
        .as_deref()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::BadRequest("OAuth2 provider did not return an email".into()))?;

    if let Some(user) = User::find_by_email(db, email).await? {
        return Ok(user);
    }

    let base = profile
        .login
        .as_deref()
        .or(profile.preferred_username.as_deref())
        .map(sanitize_username)
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| username_from_email(email));

    let username = available_username(db, &base).await?;
    let name = profile.name.clone().unwrap_or_else(|| username.clone());

    let user = User::create(
        db,
        NewUser {
            username: &username,
            email,
            name: &name,
            password_hash: None,
            roles: vec![ROLE_USER.to_string()],
        },
    )
    .await?;

    info!(user_id = %user.id, "user created from oauth2 login");
    Ok(user)
}

async fn available_username(db: &Database, base: &str) -> AppResult<String> {
    if User::find_by_username(db, base).await?.is_none() {
        return Ok(base.to_string());
    }
    for n in 1..=MAX_USERNAME_ATTEMPTS {
        let candidate = format!("{base}{n}");
        if User::find_by_username(db, &candidate).await?.is_none() {
            return Ok(candidate);
        }
    }
    Err(AppError::Conflict("Could not allocate a username".into()))
}

pub fn username_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let username = sanitize_username(local);
    if username.is_empty() {
        "user".to_string()
    } else {
        username
    }
}

fn sanitize_username(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .take(30)
        .collect()
}
