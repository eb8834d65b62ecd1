use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    AppState,
    api::load_current_user,
    error::AppResult,
    middleware::auth::CurrentUser,
    models::personal_access_token::PersonalAccessTokenResponse,
    utils::validated_json::ValidatedJson,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePersonalAccessTokenRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ListPersonalAccessTokensResponse {
    pub tokens: Vec<PersonalAccessTokenResponse>,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ValidatedJson(payload): ValidatedJson<CreatePersonalAccessTokenRequest>,
) -> AppResult<Json<PersonalAccessTokenResponse>> {
    let owner = load_current_user(&state, &current_user).await?;
    let token = state
        .personal_token_service()
        .create(&owner, &payload.name, payload.expires_at)
        .await?;
    Ok(Json(token))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<Json<ListPersonalAccessTokensResponse>> {
    let tokens = state.personal_token_service().list(&current_user.id).await?;
    Ok(Json(ListPersonalAccessTokensResponse { tokens }))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<PersonalAccessTokenResponse>> {
    let token = state
        .personal_token_service()
        .get(&current_user.id, &id)
        .await?;
    Ok(Json(token))
}

pub async fn revoke(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state
        .personal_token_service()
        .revoke(&current_user.id, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
