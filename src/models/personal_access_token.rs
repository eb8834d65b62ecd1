use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use tracing::instrument;

use crate::db::{Database, StoreError};

const PAT_COLUMNS: &str = "id, user_id, name, token_hash, revoked, created_at, expires_at";

/// Stored record of a personal access token. The raw token is never kept,
/// only its digest.
#[derive(Debug, Clone, FromRow)]
pub struct PersonalAccessToken {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub token_hash: String,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PersonalAccessTokenResponse {
    pub id: String,
    pub name: String,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Only present in the creation response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl PersonalAccessToken {
    pub fn to_response(&self, token: Option<String>) -> PersonalAccessTokenResponse {
        PersonalAccessTokenResponse {
            id: self.id.clone(),
            name: self.name.clone(),
            revoked: self.revoked,
            created_at: self.created_at,
            expires_at: self.expires_at,
            token,
        }
    }

    #[instrument(skip(db, self), fields(id = %self.id, user_id = %self.user_id))]
    pub async fn insert(&self, db: &Database) -> Result<(), StoreError> {
        db.run(
            sqlx::query(
                "INSERT INTO personal_access_tokens \
                 (id, user_id, name, token_hash, revoked, created_at, expires_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&self.id)
            .bind(&self.user_id)
            .bind(&self.name)
            .bind(&self.token_hash)
            .bind(self.revoked)
            .bind(self.created_at)
            .bind(self.expires_at)
            .execute(db.pool()),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(db))]
    pub async fn find_for_owner(
        db: &Database,
        user_id: &str,
        id: &str,
    ) -> Result<Option<PersonalAccessToken>, StoreError> {
        let query =
            format!("SELECT {PAT_COLUMNS} FROM personal_access_tokens WHERE user_id = ? AND id = ?");
        db.run(
            sqlx::query_as::<_, PersonalAccessToken>(&query)
                .bind(user_id)
                .bind(id)
                .fetch_optional(db.pool()),
        )
        .await
    }

    #[instrument(skip(db))]
    pub async fn name_taken(db: &Database, user_id: &str, name: &str) -> Result<bool, StoreError> {
        let (count,): (i64,) = db
            .run(
                sqlx::query_as(
                    "SELECT COUNT(*) FROM personal_access_tokens WHERE user_id = ? AND name = ?",
                )
                .bind(user_id)
                .bind(name)
                .fetch_one(db.pool()),
            )
            .await?;
        Ok(count > 0)
    }

    #[instrument(skip(db))]
    pub async fn list_for_owner(
        db: &Database,
        user_id: &str,
    ) -> Result<Vec<PersonalAccessToken>, StoreError> {
        let query = format!(
            "SELECT {PAT_COLUMNS} FROM personal_access_tokens WHERE user_id = ? \
             ORDER BY created_at DESC"
        );
        db.run(
            sqlx::query_as::<_, PersonalAccessToken>(&query)
                .bind(user_id)
                .fetch_all(db.pool()),
        )
        .await
    }

    /// One-way: a revoked token is never reinstated.
    #[instrument(skip(db))]
    pub async fn revoke(db: &Database, user_id: &str, id: &str) -> Result<(), StoreError> {
        db.run(
            sqlx::query(
                "UPDATE personal_access_tokens SET revoked = 1 WHERE user_id = ? AND id = ?",
            )
            .bind(user_id)
            .bind(id)
            .execute(db.pool()),
        )
        .await?;
        Ok(())
    }
}
