use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use tracing::instrument;
use uuid::Uuid;

use crate::db::{Database, StoreError};
use crate::models::user::UserRef;

/// Task row joined with the usernames of the users it references.
const TASK_SELECT: &str = "SELECT t.id, t.title, t.completed, t.completed_at, t.completed_by, \
     t.created_at, t.created_by, t.updated_at, t.updated_by, t.deleted_at, t.deleted_by, \
     cb.username AS created_by_username, \
     ub.username AS updated_by_username, \
     pb.username AS completed_by_username \
     FROM tasks t \
     LEFT JOIN users cb ON cb.id = t.created_by \
     LEFT JOIN users ub ON ub.id = t.updated_by \
     LEFT JOIN users pb ON pb.id = t.completed_by";

#[derive(Debug, Clone, FromRow)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub created_by_username: Option<String>,
    pub updated_by_username: Option<String>,
    pub completed_by_username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: String,
    pub href: String,
    pub title: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<UserRef>,
    pub created_at: DateTime<Utc>,
    pub created_by: UserRef,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<UserRef>,
}

#[derive(Debug, Serialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<TaskResponse>,
}

/// Changes applied by a PATCH; `None` leaves a field untouched.
#[derive(Debug, Default)]
pub struct TaskChanges<'a> {
    pub title: Option<&'a str>,
    pub completed: Option<bool>,
}

impl Task {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn to_response(&self, base_url: &str) -> TaskResponse {
        let user_ref = |id: &Option<String>, username: &Option<String>| {
            id.as_deref()
                .map(|id| UserRef::new(base_url, id, username.as_deref().unwrap_or_default()))
        };

        TaskResponse {
            id: self.id.clone(),
            href: format!("{}/tasks/{}", base_url.trim_end_matches('/'), self.id),
            title: self.title.clone(),
            completed: self.completed,
            completed_at: self.completed_at,
            completed_by: user_ref(&self.completed_by, &self.completed_by_username),
            created_at: self.created_at,
            created_by: UserRef::new(
                base_url,
                &self.created_by,
                self.created_by_username.as_deref().unwrap_or_default(),
            ),
            updated_at: self.updated_at,
            updated_by: user_ref(&self.updated_by, &self.updated_by_username),
        }
    }

    #[instrument(skip(db, title))]
    pub async fn create(db: &Database, title: &str, created_by: &str) -> Result<Task, StoreError> {
        let id = Uuid::new_v4().to_string();
        db.run(
            sqlx::query("INSERT INTO tasks (id, title, created_at, created_by) VALUES (?, ?, ?, ?)")
                .bind(&id)
                .bind(title)
                .bind(Utc::now())
                .bind(created_by)
                .execute(db.pool()),
        )
        .await?;

        Self::find_by_id(db, &id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    /// Includes soft-deleted tasks so callers can tell "gone" from "never existed".
    #[instrument(skip(db))]
    pub async fn find_by_id(db: &Database, id: &str) -> Result<Option<Task>, StoreError> {
        let query = format!("{TASK_SELECT} WHERE t.id = ?");
        db.run(sqlx::query_as::<_, Task>(&query).bind(id).fetch_optional(db.pool()))
            .await
    }

    #[instrument(skip(db))]
    pub async fn count_active(db: &Database) -> Result<i64, StoreError> {
        let (count,): (i64,) = db
            .run(
                sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE deleted_at IS NULL")
                    .fetch_one(db.pool()),
            )
            .await?;
        Ok(count)
    }

    #[instrument(skip(db))]
    pub async fn list_active(db: &Database, limit: i64, skip: i64) -> Result<Vec<Task>, StoreError> {
        let query = format!(
            "{TASK_SELECT} WHERE t.deleted_at IS NULL ORDER BY t.created_at DESC, t.id \
             LIMIT ? OFFSET ?"
        );
        db.run(
            sqlx::query_as::<_, Task>(&query)
                .bind(limit)
                .bind(skip)
                .fetch_all(db.pool()),
        )
        .await
    }

    /// Applies `changes` on behalf of `user_id`. Completing stamps
    /// `completed_at`/`completed_by`; un-completing clears them.
    #[instrument(skip(db, changes))]
    pub async fn update(
        db: &Database,
        id: &str,
        user_id: &str,
        changes: TaskChanges<'_>,
    ) -> Result<Option<Task>, StoreError> {
        let now = Utc::now();
        let (completed_at, completed_by) = match changes.completed {
            Some(true) => (Some(now), Some(user_id)),
            _ => (None, None),
        };

        db.run(
            sqlx::query(
                "UPDATE tasks SET \
                 title = COALESCE(?, title), \
                 completed_at = CASE WHEN ? IS NULL OR ? = completed THEN completed_at ELSE ? END, \
                 completed_by = CASE WHEN ? IS NULL OR ? = completed THEN completed_by ELSE ? END, \
                 completed = COALESCE(?, completed), \
                 updated_at = ?, updated_by = ? \
                 WHERE id = ?",
            )
            .bind(changes.title)
            .bind(changes.completed)
            .bind(changes.completed)
            .bind(completed_at)
            .bind(changes.completed)
            .bind(changes.completed)
            .bind(completed_by)
            .bind(changes.completed)
            .bind(now)
            .bind(user_id)
            .bind(id)
            .execute(db.pool()),
        )
        .await?;

        Self::find_by_id(db, id).await
    }

    #[instrument(skip(db))]
    pub async fn soft_delete(db: &Database, id: &str, user_id: &str) -> Result<(), StoreError> {
        db.run(
            sqlx::query("UPDATE tasks SET deleted_at = ?, deleted_by = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(user_id)
                .bind(id)
                .execute(db.pool()),
        )
        .await?;
        Ok(())
    }
}
