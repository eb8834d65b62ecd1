use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    error::{AppError, AppResult},
    middleware::auth::CurrentUser,
};

/// Enforces the role policy. Runs after [`super::auth::authenticate`];
/// anonymous callers are checked with no roles.
pub async fn authorize(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> AppResult<Response> {
    let roles = request
        .extensions()
        .get::<CurrentUser>()
        .map(|user| user.roles.as_slice())
        .unwrap_or_default();

    if !state
        .policy
        .enforce(roles, request.uri().path(), request.method())
    {
        return Err(AppError::Forbidden("Forbidden".into()));
    }

    Ok(next.run(request).await)
}
