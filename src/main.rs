use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use thiserror::Error;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod db;
mod error;
mod middleware;
mod models;
mod services;
mod utils;
#[cfg(test)]
mod tests;

use crate::{
    config::{APP_NAME, Config, ConfigError},
    db::{Database, StoreError},
    error::{AppError, AppResult},
    services::{
        auth_service::AuthService,
        bootstrap_service::{self, BootstrapOutcome},
        cookie_service::CookieService,
        csrf_service::CsrfService,
        jwt_service::JwtService,
        oauth2_service::OAuth2Service,
        personal_token_service::PersonalTokenService,
        policy_service::{Policy, PolicyError},
    },
};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid signing keys: {0}")]
    Keys(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("admin bootstrap failed: {0:?}")]
    Bootstrap(AppError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Shared, read-only request state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub jwt_service: JwtService,
    pub csrf: CsrfService,
    pub cookies: CookieService,
    pub policy: Arc<Policy>,
    pub oauth2: Option<OAuth2Service>,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Result<Self, StartupError> {
        let jwt_service = JwtService::new(&config.jwt)?;
        let policy = Policy::load(config.policy_path.as_deref())?;

        let oauth2 = match &config.oauth2 {
            Some(oauth2) => {
                let client = reqwest::Client::builder().user_agent(APP_NAME).build()?;
                Some(OAuth2Service::new(oauth2.clone(), client))
            }
            None => None,
        };

        Ok(Self {
            db,
            jwt_service,
            csrf: CsrfService::new(&config),
            cookies: CookieService::new(&config),
            policy: Arc::new(policy),
            oauth2,
            config: Arc::new(config),
        })
    }

    pub fn auth_service(&self) -> AuthService {
        AuthService::new(
            self.db.clone(),
            self.jwt_service.clone(),
            self.config.bcrypt_cost,
        )
    }

    pub fn personal_token_service(&self) -> PersonalTokenService {
        PersonalTokenService::new(self.db.clone(), self.jwt_service.clone())
    }

    pub fn oauth2_service(&self) -> AppResult<&OAuth2Service> {
        self.oauth2
            .as_ref()
            .ok_or_else(|| AppError::NotFound("OAuth2 login is not configured".into()))
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(api::root::index))
        .route("/healthz", get(api::root::healthz))
        .route("/auth/signup", post(api::auth::signup))
        .route("/auth/login", post(api::auth::login))
        .route("/auth/refresh", post(api::auth::refresh))
        .route("/auth/logout", post(api::auth::logout))
        .route("/oauth2/login", get(api::oauth2::login))
        .route("/oauth2/callback", get(api::oauth2::callback))
        .route(
            "/user",
            get(api::user::get_current_user).patch(api::user::update_current_user),
        )
        .route(
            "/user/personal_access_tokens",
            get(api::personal_access_tokens::list).post(api::personal_access_tokens::create),
        )
        .route(
            "/user/personal_access_tokens/:id",
            get(api::personal_access_tokens::get).delete(api::personal_access_tokens::revoke),
        )
        .route("/users", get(api::user::list_users))
        .route("/users/:username", get(api::user::get_user))
        .route(
            "/tasks",
            get(api::tasks::list_tasks).post(api::tasks::create_task),
        )
        .route(
            "/tasks/:id",
            get(api::tasks::get_task)
                .patch(api::tasks::update_task)
                .delete(api::tasks::delete_task),
        )
        // route layers run only for matched routes; the last added runs first
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::authorization::authorize,
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ))
        .layer(CookieManagerLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = db::create_db_pool(&config.database_url).await?;
    let db = Database::new(pool, config.store_timeout);

    match bootstrap_service::ensure_admin(&db, &config.admin, config.bcrypt_cost)
        .await
        .map_err(StartupError::Bootstrap)?
    {
        BootstrapOutcome::Created => info!(username = %config.admin.username, "admin created"),
        BootstrapOutcome::AlreadyPresent | BootstrapOutcome::Disabled => {}
    }

    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(config, db)?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on {}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
