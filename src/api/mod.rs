pub mod auth;
pub mod oauth2;
pub mod personal_access_tokens;
pub mod root;
pub mod tasks;
pub mod user;

use crate::{
    AppState,
    error::{AppError, AppResult},
    middleware::auth::CurrentUser,
    models::user::User,
};

/// Loads the authenticated caller's record. A valid token for a user that
/// no longer exists is treated as an invalid token.
pub async fn load_current_user(state: &AppState, current_user: &CurrentUser) -> AppResult<User> {
    User::find_by_id(&state.db, &current_user.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Token invalid".into()))
}
