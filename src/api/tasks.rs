use axum::{
    Json,
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::{
    AppState,
    db::Database,
    error::{AppError, AppResult},
    middleware::auth::CurrentUser,
    models::task::{ListTasksResponse, Task, TaskChanges, TaskResponse},
    utils::{
        pagination::{PageRequest, Pagination},
        validated_json::ValidatedJson,
    },
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub completed: Option<bool>,
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ValidatedJson(payload): ValidatedJson<CreateTaskRequest>,
) -> AppResult<Json<TaskResponse>> {
    let task = Task::create(&state.db, &payload.title, &current_user.id).await?;
    info!(task_id = %task.id, user_id = %current_user.id, "task created");
    Ok(Json(task.to_response(&state.config.base_url)))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    page: PageRequest,
) -> AppResult<(HeaderMap, Json<ListTasksResponse>)> {
    let total = Task::count_active(&state.db).await?;
    let pagination = Pagination::from_request(total, &page, state.config.pagination);

    let tasks = Task::list_active(&state.db, pagination.limit(), pagination.skip()).await?;
    let base_url = &state.config.base_url;

    Ok((
        pagination.headers(&page, base_url),
        Json(ListTasksResponse {
            tasks: tasks.iter().map(|t| t.to_response(base_url)).collect(),
        }),
    ))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<TaskResponse>> {
    let task = find_live_task(&state.db, &id).await?;
    Ok(Json(task.to_response(&state.config.base_url)))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdateTaskRequest>,
) -> AppResult<Json<TaskResponse>> {
    let task = find_live_task(&state.db, &id).await?;
    ensure_can_modify(&task, &current_user)?;

    let changes = TaskChanges {
        title: payload.title.as_deref(),
        completed: payload.completed,
    };
    let task = Task::update(&state.db, &task.id, &current_user.id, changes)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))?;

    Ok(Json(task.to_response(&state.config.base_url)))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let task = find_live_task(&state.db, &id).await?;
    ensure_can_modify(&task, &current_user)?;

    Task::soft_delete(&state.db, &task.id, &current_user.id).await?;
    info!(task_id = %task.id, user_id = %current_user.id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn find_live_task(db: &Database, id: &str) -> AppResult<Task> {
    let task = Task::find_by_id(db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))?;

    if task.is_deleted() {
        return Err(AppError::Gone("Task was deleted".into()));
    }
    Ok(task)
}

fn ensure_can_modify(task: &Task, user: &CurrentUser) -> AppResult<()> {
    if task.created_by == user.id || user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("You don't have access to this task".into()))
    }
}
