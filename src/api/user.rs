use axum::{
    Json,
    extract::{Extension, Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    AppState,
    api::load_current_user,
    error::{AppError, AppResult},
    middleware::auth::CurrentUser,
    models::user::{User, UserResponse},
    utils::{
        pagination::{PageRequest, Pagination},
        validated_json::ValidatedJson,
    },
};

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub bio: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    pub users: Vec<UserResponse>,
}

pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<UserResponse>> {
    let user = load_current_user(&state, &current_user).await?;
    Ok(Json(user.to_response(&state.config.base_url)))
}

pub async fn update_current_user(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ValidatedJson(payload): ValidatedJson<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = User::update_profile(
        &state.db,
        &current_user.id,
        payload.name.as_deref(),
        payload.bio.as_deref(),
    )
    .await?
    .ok_or_else(|| AppError::Unauthorized("Token invalid".into()))?;

    Ok(Json(user.to_response(&state.config.base_url)))
}

/// Public profile, or the full record when the caller is the user in
/// question or an admin.
pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    current_user: Option<Extension<CurrentUser>>,
) -> AppResult<Response> {
    let user = User::find_by_id_or_username(&state.db, &username)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let base_url = &state.config.base_url;
    let full_view = current_user
        .as_ref()
        .is_some_and(|Extension(caller)| caller.id == user.id || caller.is_admin());

    if full_view {
        Ok(Json(user.to_response(base_url)).into_response())
    } else {
        Ok(Json(user.to_public(base_url)).into_response())
    }
}

/// Admin only; enforced by the policy.
pub async fn list_users(
    State(state): State<AppState>,
    page: PageRequest,
) -> AppResult<(HeaderMap, Json<ListUsersResponse>)> {
    let total = User::count(&state.db).await?;
    let pagination = Pagination::from_request(total, &page, state.config.pagination);

    let users = User::list(&state.db, pagination.limit(), pagination.skip()).await?;
    let base_url = &state.config.base_url;

    Ok((
        pagination.headers(&page, base_url),
        Json(ListUsersResponse {
            users: users.iter().map(|u| u.to_response(base_url)).collect(),
        }),
    ))
}
