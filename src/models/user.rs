use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, types::Json};
use tracing::instrument;
use uuid::Uuid;

use crate::db::{Database, StoreError};

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SUPER: &str = "super";

const USER_COLUMNS: &str = "id, username, email, name, bio, password_hash, roles, \
     refresh_token_id, created_at, updated_at, last_login_at, last_refresh_at";

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub name: String,
    pub bio: String,
    pub password_hash: Option<String>,
    pub roles: Json<Vec<String>>,
    pub refresh_token_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_refresh_at: Option<DateTime<Utc>>,
}

/// What any caller may see about a user.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: String,
    pub href: String,
    pub username: String,
    pub name: String,
    pub bio: String,
    pub created_at: DateTime<Utc>,
}

/// The full record, returned to the user themself and to admins.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub href: String,
    pub username: String,
    pub email: String,
    pub name: String,
    pub bio: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_refresh_at: Option<DateTime<Utc>>,
}

/// Compact reference embedded in other resources.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserRef {
    pub id: String,
    pub username: String,
    pub href: String,
}

impl UserRef {
    pub fn new(base_url: &str, id: &str, username: &str) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            href: user_href(base_url, id),
        }
    }
}

pub fn user_href(base_url: &str, id: &str) -> String {
    format!("{}/users/{}", base_url.trim_end_matches('/'), id)
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub name: &'a str,
    pub password_hash: Option<&'a str>,
    pub roles: Vec<String>,
}

impl User {
    pub fn roles(&self) -> &[String] {
        &self.roles.0
    }

    pub fn to_public(&self, base_url: &str) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            href: user_href(base_url, &self.id),
            username: self.username.clone(),
            name: self.name.clone(),
            bio: self.bio.clone(),
            created_at: self.created_at,
        }
    }

    pub fn to_response(&self, base_url: &str) -> UserResponse {
        UserResponse {
            id: self.id.clone(),
            href: user_href(base_url, &self.id),
            username: self.username.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            bio: self.bio.clone(),
            roles: self.roles.0.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_login_at: self.last_login_at,
            last_refresh_at: self.last_refresh_at,
        }
    }

    #[instrument(skip(db, new_user), fields(username = new_user.username))]
    pub async fn create(db: &Database, new_user: NewUser<'_>) -> Result<User, StoreError> {
        let id = Uuid::new_v4().to_string();
        let query = format!(
            "INSERT INTO users (id, username, email, name, password_hash, roles, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {USER_COLUMNS}"
        );

        db.run(
            sqlx::query_as::<_, User>(&query)
                .bind(&id)
                .bind(new_user.username)
                .bind(new_user.email)
                .bind(new_user.name)
                .bind(new_user.password_hash)
                .bind(Json(&new_user.roles))
                .bind(Utc::now())
                .fetch_one(db.pool()),
        )
        .await
    }

    #[instrument(skip(db))]
    pub async fn find_by_id(db: &Database, id: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        db.run(sqlx::query_as::<_, User>(&query).bind(id).fetch_optional(db.pool()))
            .await
    }

    #[instrument(skip(db))]
    pub async fn find_by_username(
        db: &Database,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?");
        db.run(sqlx::query_as::<_, User>(&query).bind(username).fetch_optional(db.pool()))
            .await
    }

    #[instrument(skip(db))]
    pub async fn find_by_email(db: &Database, email: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        db.run(sqlx::query_as::<_, User>(&query).bind(email).fetch_optional(db.pool()))
            .await
    }

    /// Looks a user up by id or username.
    #[instrument(skip(db))]
    pub async fn find_by_id_or_username(
        db: &Database,
        id_or_username: &str,
    ) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? OR username = ?");
        db.run(
            sqlx::query_as::<_, User>(&query)
                .bind(id_or_username)
                .bind(id_or_username)
                .fetch_optional(db.pool()),
        )
        .await
    }

    #[instrument(skip(db))]
    pub async fn exists(db: &Database, username: &str, email: &str) -> Result<bool, StoreError> {
        let (count,): (i64,) = db
            .run(
                sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ? OR email = ?")
                    .bind(username)
                    .bind(email)
                    .fetch_one(db.pool()),
            )
            .await?;
        Ok(count > 0)
    }

    #[instrument(skip(db, name, bio))]
    pub async fn update_profile(
        db: &Database,
        id: &str,
        name: Option<&str>,
        bio: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        let query = format!(
            "UPDATE users SET name = COALESCE(?, name), bio = COALESCE(?, bio), updated_at = ? \
             WHERE id = ? RETURNING {USER_COLUMNS}"
        );
        db.run(
            sqlx::query_as::<_, User>(&query)
                .bind(name)
                .bind(bio)
                .bind(Utc::now())
                .bind(id)
                .fetch_optional(db.pool()),
        )
        .await
    }

    /// Records a login: stores the new refresh token id and the login time.
    #[instrument(skip(db, refresh_token_id))]
    pub async fn record_login(
        db: &Database,
        id: &str,
        refresh_token_id: &str,
    ) -> Result<(), StoreError> {
        db.run(
            sqlx::query("UPDATE users SET refresh_token_id = ?, last_login_at = ? WHERE id = ?")
                .bind(refresh_token_id)
                .bind(Utc::now())
                .bind(id)
                .execute(db.pool()),
        )
        .await?;
        Ok(())
    }

    /// Replaces the stored refresh token id. Not a compare-and-swap: with two
    /// concurrent refreshes for the same user the last write wins.
    #[instrument(skip(db, refresh_token_id))]
    pub async fn record_refresh(
        db: &Database,
        id: &str,
        refresh_token_id: &str,
    ) -> Result<(), StoreError> {
        db.run(
            sqlx::query("UPDATE users SET refresh_token_id = ?, last_refresh_at = ? WHERE id = ?")
                .bind(refresh_token_id)
                .bind(Utc::now())
                .bind(id)
                .execute(db.pool()),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(db))]
    pub async fn clear_refresh_token(db: &Database, id: &str) -> Result<(), StoreError> {
        db.run(
            sqlx::query("UPDATE users SET refresh_token_id = NULL WHERE id = ?")
                .bind(id)
                .execute(db.pool()),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(db))]
    pub async fn count(db: &Database) -> Result<i64, StoreError> {
        let (count,): (i64,) = db
            .run(sqlx::query_as("SELECT COUNT(*) FROM users").fetch_one(db.pool()))
            .await?;
        Ok(count)
    }

    #[instrument(skip(db))]
    pub async fn list(db: &Database, limit: i64, skip: i64) -> Result<Vec<User>, StoreError> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id LIMIT ? OFFSET ?"
        );
        db.run(
            sqlx::query_as::<_, User>(&query)
                .bind(limit)
                .bind(skip)
                .fetch_all(db.pool()),
        )
        .await
    }
}
