use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument};

use crate::{
    AppState,
    error::{AppError, AppResult},
    middleware::token_source::{self, TokenSource},
    models::{
        jwt::TokenType,
        user::{ROLE_ADMIN, ROLE_SUPER},
    },
};

/// The authenticated caller, inserted into request extensions.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: String,
    /// Effective roles: the claim roles for session tokens, the owner's
    /// current roles for personal tokens.
    pub roles: Vec<String>,
    pub token_type: TokenType,
    pub source: TokenSource,
}

impl CurrentUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN) || self.has_role(ROLE_SUPER)
    }
}

/// Resolves and validates the caller's token. Exempt routes skip this
/// entirely; optional routes let anonymous callers through but still reject
/// a bad token.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> AppResult<Response> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let routes = &state.config.routes;

    if routes.exempt.contains(&path, &method) {
        return Ok(next.run(request).await);
    }

    let Some(resolved) = token_source::resolve(request.headers(), &state.config.cookies)? else {
        if routes.optional.contains(&path, &method) {
            debug!("anonymous request on optional route");
            return Ok(next.run(request).await);
        }
        return Err(AppError::Unauthorized("Token missing".into()));
    };

    let claims = state.jwt_service.validate_access(&resolved.token)?;

    let roles = match claims.token_type {
        TokenType::Personal => {
            let owner = state
                .personal_token_service()
                .verify(&claims, &resolved.token)
                .await?;
            owner.roles().to_vec()
        }
        _ => claims.roles.clone(),
    };

    if state.csrf.applies(resolved.source, &method) {
        let headers = request.headers();
        let header_value = headers
            .get(state.csrf.header_name())
            .and_then(|v| v.to_str().ok());
        let cookie_value =
            token_source::cookie_value(headers, &state.config.cookies.access_token_name);
        state.csrf.validate(cookie_value.as_deref(), header_value)?;
    }

    let current_user = CurrentUser {
        id: claims.sub,
        roles,
        token_type: claims.token_type,
        source: resolved.source,
    };
    debug!(
        user_id = %current_user.id,
        token_type = current_user.token_type.as_str(),
        source = ?current_user.source,
        "authenticated"
    );
    request.extensions_mut().insert(current_user);

    Ok(next.run(request).await)
}
