// src/services/personal_token_service.rs
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::jwt::{AccessClaims, TokenType};
use crate::models::personal_access_token::{PersonalAccessToken, PersonalAccessTokenResponse};
use crate::models::user::User;
use crate::services::jwt_service::JwtService;
use crate::utils::crypto::{digest_matches, hash_token};

#[derive(Clone)]
pub struct PersonalTokenService {
    db: Database,
    jwt_service: JwtService,
}

impl PersonalTokenService {
    pub fn new(db: Database, jwt_service: JwtService) -> Self {
        Self { db, jwt_service }
    }

    /* ---------- GATE ---------- */

    /// Checks a decoded personal token against its stored record and returns
    /// the owner, whose current roles replace the ones baked into the token.
    #[instrument(skip(self, claims, raw_token), fields(user_id = %claims.sub))]
    pub async fn verify(&self, claims: &AccessClaims, raw_token: &str) -> AppResult<User> {
        let token_id = match (&claims.token_type, &claims.jti) {
            (TokenType::Personal, Some(jti)) => jti,
            _ => return Err(AppError::Unauthorized("Token invalid".into())),
        };

        let record = PersonalAccessToken::find_for_owner(&self.db, &claims.sub, token_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Token invalid".into()))?;

        if !digest_matches(&record.token_hash, raw_token) {
            warn!(token_id = %record.id, "personal token digest mismatch");
            return Err(AppError::Unauthorized("Token mismatch".into()));
        }
        if record.revoked {
            return Err(AppError::Unauthorized("Token is revoked".into()));
        }

        User::find_by_id(&self.db, &claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Token invalid".into()))
    }

    /* ---------- MANAGEMENT ---------- */

    /// Creates a token for `owner`. The raw token is only ever returned here.
    #[instrument(skip(self, owner), fields(user_id = %owner.id))]
    pub async fn create(
        &self,
        owner: &User,
        name: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<PersonalAccessTokenResponse> {
        if expires_at <= Utc::now() {
            return Err(AppError::unprocessable("expires_at must be in the future"));
        }
        if PersonalAccessToken::name_taken(&self.db, &owner.id, name).await? {
            return Err(AppError::Conflict("Token name already in use".into()));
        }

        let id = Uuid::new_v4().to_string();
        let token =
            self.jwt_service
                .issue_personal_token(&owner.id, owner.roles(), &id, expires_at)?;

        let record = PersonalAccessToken {
            id,
            user_id: owner.id.clone(),
            name: name.to_string(),
            token_hash: hash_token(&token),
            revoked: false,
            created_at: Utc::now(),
            expires_at,
        };
        record.insert(&self.db).await.map_err(|e| {
            if e.is_unique_violation() {
                AppError::Conflict("Token name already in use".into())
            } else {
                e.into()
            }
        })?;

        info!(token_id = %record.id, "personal access token created");
        Ok(record.to_response(Some(token)))
    }

    pub async fn list(&self, owner_id: &str) -> AppResult<Vec<PersonalAccessTokenResponse>> {
        let records = PersonalAccessToken::list_for_owner(&self.db, owner_id).await?;
        Ok(records.iter().map(|r| r.to_response(None)).collect())
    }

    pub async fn get(&self, owner_id: &str, id: &str) -> AppResult<PersonalAccessTokenResponse> {
        self.find(owner_id, id).await.map(|r| r.to_response(None))
    }

    /// Revoking an already revoked token succeeds.
    #[instrument(skip(self))]
    pub async fn revoke(&self, owner_id: &str, id: &str) -> AppResult<()> {
        let record = self.find(owner_id, id).await?;
        if !record.revoked {
            PersonalAccessToken::revoke(&self.db, owner_id, id).await?;
            info!(token_id = %id, "personal access token revoked");
        }
        Ok(())
    }

    async fn find(&self, owner_id: &str, id: &str) -> AppResult<PersonalAccessToken> {
        PersonalAccessToken::find_for_owner(&self.db, owner_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Personal access token not found".into()))
    }
}
