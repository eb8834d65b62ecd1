use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
};
use serde::Deserialize;
use tower_cookies::Cookies;
use validator::Validate;

use crate::{
    AppState,
    error::{AppError, AppResult},
    middleware::auth::CurrentUser,
    models::{jwt::TokenResponse, user::UserResponse},
    utils::validated_json::{OptionalValidatedJson, ValidatedJson},
};

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 2, max = 30))]
    pub username: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    // bcrypt only looks at the first 72 bytes
    #[validate(length(min = 12, max = 72))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<SignupRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = state
        .auth_service()
        .signup(
            &payload.email,
            &payload.username,
            &payload.name,
            &payload.password,
        )
        .await?;

    Ok(Json(user.to_response(&state.config.base_url)))
}

pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let login = payload
        .email
        .as_deref()
        .or(payload.username.as_deref())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| AppError::unprocessable("email or username is required"))?;

    let (_, tokens) = state.auth_service().login(login, &payload.password).await?;
    respond_with_tokens(&state, &cookies, tokens)
}

/// The refresh token comes from the refresh cookie when cookie auth is on,
/// otherwise from the JSON body.
pub async fn refresh(
    State(state): State<AppState>,
    cookies: Cookies,
    OptionalValidatedJson(payload): OptionalValidatedJson<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let token = state
        .cookies
        .refresh_token(&cookies)
        .or(payload.map(|p| p.refresh_token))
        .ok_or_else(|| AppError::BadRequest("Request malformed".into()))?;

    let (_, tokens) = state.auth_service().refresh(&token).await?;
    respond_with_tokens(&state, &cookies, tokens)
}

pub async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
    Extension(current_user): Extension<CurrentUser>,
) -> AppResult<StatusCode> {
    state.auth_service().logout(&current_user.id).await?;
    state.cookies.clear_auth_cookies(&cookies);
    Ok(StatusCode::NO_CONTENT)
}

/// Sets the auth cookies (and CSRF cookie, when enabled) for a freshly
/// issued token pair.
pub fn respond_with_tokens(
    state: &AppState,
    cookies: &Cookies,
    tokens: TokenResponse,
) -> AppResult<Json<TokenResponse>> {
    let csrf_token = if state.csrf.is_enabled() {
        Some(state.csrf.token_for(&tokens.access_token)?)
    } else {
        None
    };

    state.cookies.set_auth_cookies(
        cookies,
        &tokens.access_token,
        &tokens.refresh_token,
        csrf_token.as_deref(),
    );
    Ok(Json(tokens))
}
