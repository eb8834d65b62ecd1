use axum::{
    Json,
    extract::{Query, State},
    response::Redirect,
};
use serde::Deserialize;
use tower_cookies::Cookies;
use tracing::warn;

use crate::{
    AppState,
    api::auth::respond_with_tokens,
    error::{AppError, AppResult},
    models::jwt::TokenResponse,
    services::{auth_service::SessionKind, oauth2_service},
    utils::crypto::random_string,
};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub async fn login(State(state): State<AppState>, cookies: Cookies) -> AppResult<Redirect> {
    let oauth2 = state.oauth2_service()?;

    let oauth_state = random_string(32);
    state.cookies.set_oauth2_state(&cookies, &oauth_state);

    Ok(Redirect::temporary(&oauth2.authorize_url(&oauth_state)?))
}

pub async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<CallbackQuery>,
) -> AppResult<Json<TokenResponse>> {
    let oauth2 = state.oauth2_service()?;

    if let Some(error) = query.error {
        warn!(error, "oauth2 provider returned an error");
        return Err(AppError::Unauthorized("OAuth2 login failed".into()));
    }

    let expected = state.cookies.take_oauth2_state(&cookies);
    match (expected, query.state) {
        (Some(expected), Some(received)) if expected == received => {}
        _ => return Err(AppError::BadRequest("Invalid OAuth2 state".into())),
    }

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Request malformed".into()))?;

    let provider_token = oauth2.exchange_code(&code).await?;
    let profile = oauth2.fetch_user(&provider_token).await?;
    let user = oauth2_service::find_or_create_user(&state.db, &profile).await?;

    let tokens = state
        .auth_service()
        .issue_session(&user, SessionKind::Login)
        .await?;
    respond_with_tokens(&state, &cookies, tokens)
}
