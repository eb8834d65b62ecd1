// src/services/auth_service.rs
use bcrypt::{hash, verify};
use tracing::{info, instrument, warn};

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::jwt::TokenResponse;
use crate::models::user::{NewUser, ROLE_USER, User};
use crate::services::jwt_service::JwtService;

/// How a freshly issued refresh token id is recorded on the user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Login,
    Refresh,
}

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    jwt_service: JwtService,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(db: Database, jwt_service: JwtService, bcrypt_cost: u32) -> Self {
        Self {
            db,
            jwt_service,
            bcrypt_cost,
        }
    }

    #[instrument(skip(self, email, name, password))]
    pub async fn signup(
        &self,
        email: &str,
        username: &str,
        name: &str,
        password: &str,
    ) -> AppResult<User> {
        if !is_valid_username(username) {
            return Err(AppError::unprocessable(
                "username may only contain letters, digits, '.', '-' and '_'",
            ));
        }
        if User::exists(&self.db, username, email).await? {
            return Err(AppError::Conflict("Email or username already in use".into()));
        }

        let password_hash = hash(password, self.bcrypt_cost)?;
        let user = User::create(
            &self.db,
            NewUser {
                username,
                email,
                name,
                password_hash: Some(&password_hash),
                roles: vec![ROLE_USER.to_string()],
            },
        )
        .await
        .map_err(|e| {
            // lost a race with a concurrent signup
            if e.is_unique_violation() {
                AppError::Conflict("Email or username already in use".into())
            } else {
                e.into()
            }
        })?;

        info!(user_id = %user.id, "user signed up");
        Ok(user)
    }

    /// `login` is either an email address or a username.
    #[instrument(skip(self, password))]
    pub async fn login(&self, login: &str, password: &str) -> AppResult<(User, TokenResponse)> {
        let invalid = || AppError::Unauthorized("Invalid email or password".into());

        let user = match User::find_by_email(&self.db, login).await? {
            Some(user) => Some(user),
            None => User::find_by_username(&self.db, login).await?,
        }
        .ok_or_else(invalid)?;

        // accounts created through OAuth2 have no password
        let Some(password_hash) = user.password_hash.as_deref() else {
            return Err(invalid());
        };
        if !verify(password, password_hash)? {
            warn!(user_id = %user.id, "failed login attempt");
            return Err(invalid());
        }

        let tokens = self.issue_session(&user, SessionKind::Login).await?;
        info!(user_id = %user.id, "user logged in");
        Ok((user, tokens))
    }

    /// Exchanges a refresh token for a new token pair, rotating the stored id.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<(User, TokenResponse)> {
        let claims = self.jwt_service.validate_refresh(refresh_token)?;

        let user = User::find_by_id(&self.db, &claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Token invalid".into()))?;

        if user.refresh_token_id.as_deref() != Some(claims.jti.as_str()) {
            warn!(user_id = %user.id, "refresh token does not match the current one");
            return Err(AppError::Unauthorized("Token mismatch".into()));
        }

        let tokens = self.issue_session(&user, SessionKind::Refresh).await?;
        Ok((user, tokens))
    }

    #[instrument(skip(self))]
    pub async fn logout(&self, user_id: &str) -> AppResult<()> {
        User::clear_refresh_token(&self.db, user_id).await?;
        info!(user_id, "user logged out");
        Ok(())
    }

    /// Issues an access/refresh pair and records the refresh token id.
    pub async fn issue_session(&self, user: &User, kind: SessionKind) -> AppResult<TokenResponse> {
        let (access_token, _) = self.jwt_service.issue_access_token(&user.id, user.roles())?;
        let (refresh_token, refresh_id) = self.jwt_service.issue_refresh_token(&user.id)?;

        match kind {
            SessionKind::Login => User::record_login(&self.db, &user.id, &refresh_id).await?,
            SessionKind::Refresh => User::record_refresh(&self.db, &user.id, &refresh_id).await?,
        }

        Ok(TokenResponse {
            access_token,
            expires_in: self.jwt_service.access_ttl().num_seconds(),
            refresh_token,
            token_type: "Bearer".to_string(),
        })
    }
}

pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}
