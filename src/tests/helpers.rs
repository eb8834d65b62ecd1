use std::{sync::Once, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
};
use cookie::{Cookie, SameSite};
use serde_json::Value;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions, types::Json};
use tower::ServiceExt;
use tracing::{Level, info};
use tracing_subscriber::fmt::format::FmtSpan;

use crate::{
    AppState,
    config::{
        ACCESS_TOKEN_COOKIE, APP_NAME, AdminConfig, CSRF_HEADER, CSRF_TOKEN_COOKIE, Config,
        CookieConfig, CsrfConfig, JwtConfig, PaginationConfig, REFRESH_TOKEN_COOKIE, RouteRules,
    },
    db::{self, Database},
    models::user::{NewUser, User},
    services::jwt_service::JwtService,
};

pub const TEST_PASSWORD: &str = "correct-horse-battery";
pub const TEST_BCRYPT_COST: u32 = 4;
pub const CSRF_SECRET: &str = "test-csrf-secret";

static INIT: Once = Once::new();

/// Initialize logging exactly once
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_target(false)
            .with_thread_ids(true)
            .with_level(true)
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_max_level(Level::ERROR)
            .with_span_events(FmtSpan::NONE)
            .init();
    });
}

pub fn test_jwt_config() -> JwtConfig {
    JwtConfig {
        issuer: APP_NAME.to_string(),
        private_key: include_str!("../../keys/dev-private-key.pem").to_string(),
        public_key: include_str!("../../keys/dev-public-key.pem").to_string(),
        access_token_ttl: chrono::Duration::minutes(10),
        refresh_token_ttl: chrono::Duration::days(30),
    }
}

pub fn test_config(csrf_enabled: bool) -> Config {
    Config {
        bind_addr: "127.0.0.1:0".into(),
        base_url: "http://localhost:1323".into(),
        database_url: "sqlite::memory:".into(),
        store_timeout: Duration::from_secs(5),
        bcrypt_cost: TEST_BCRYPT_COST,
        policy_path: None,
        jwt: test_jwt_config(),
        cookies: CookieConfig {
            enabled: true,
            access_token_name: ACCESS_TOKEN_COOKIE.into(),
            refresh_token_name: REFRESH_TOKEN_COOKIE.into(),
            domain: None,
            secure: true,
            same_site: SameSite::Strict,
        },
        csrf: CsrfConfig {
            enabled: csrf_enabled,
            secret_key: CSRF_SECRET.into(),
            header_name: CSRF_HEADER.into(),
            cookie_name: CSRF_TOKEN_COOKIE.into(),
        },
        pagination: PaginationConfig::default(),
        admin: AdminConfig::default(),
        oauth2: None,
        routes: RouteRules::default(),
    }
}

pub async fn setup_test_db() -> SqlitePool {
    init_tracing();
    info!("Setting up test database");

    // A single connection that never expires keeps the in-memory database alive.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    db::migrate(&pool).await.expect("Failed to run migrations");

    info!("Test database setup complete");
    pool
}

pub fn test_db(pool: &SqlitePool) -> Database {
    Database::new(pool.clone(), Duration::from_secs(5))
}

pub fn create_test_app(pool: SqlitePool) -> Router {
    create_test_app_with_config(pool, test_config(false))
}

pub fn create_test_app_with_config(pool: SqlitePool, config: Config) -> Router {
    info!("Creating test application");
    let state = AppState::new(config, test_db(&pool)).expect("Failed to build app state");
    super::super::create_router(state)
}

pub fn jwt_service() -> JwtService {
    JwtService::new(&test_jwt_config()).unwrap()
}

/* ---------- FIXTURES ---------- */

pub async fn create_user(db: &Database, username: &str, roles: &[&str]) -> User {
    let password_hash = bcrypt::hash(TEST_PASSWORD, TEST_BCRYPT_COST).unwrap();
    let email = format!("{username}@example.com");

    User::create(
        db,
        NewUser {
            username,
            email: &email,
            name: username,
            password_hash: Some(&password_hash),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        },
    )
    .await
    .unwrap()
}

pub async fn set_roles(pool: &SqlitePool, user_id: &str, roles: &[&str]) {
    let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
    sqlx::query("UPDATE users SET roles = ? WHERE id = ?")
        .bind(Json(roles))
        .bind(user_id)
        .execute(pool)
        .await
        .unwrap();
}

/// A session access token for `user`, signed with the test keys.
pub fn session_token(user: &User) -> String {
    jwt_service()
        .issue_access_token(&user.id, user.roles())
        .unwrap()
        .0
}

pub fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers
}

/* ---------- REQUESTS ---------- */

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, String, HeaderMap) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = String::from_utf8(
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec(),
    )
    .unwrap();

    info!(status = %status, body = %body, "Test response received");
    (status, body, headers)
}

pub async fn test_request(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: Option<HeaderMap>,
    cookies: Option<&[(&str, &str)]>,
) -> (StatusCode, String, HeaderMap) {
    info!(method = %method, uri = %uri, "Making test request");

    let body = match body {
        Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
        None => Body::empty(),
    };

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "example.com")
        .header(header::CONTENT_TYPE, "application/json");

    if let Some(cookies) = cookies {
        if !cookies.is_empty() {
            let cookie_header = cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(header::COOKIE, cookie_header);
        }
    }

    if let Some(custom_headers) = headers {
        for (key, value) in custom_headers.iter() {
            request = request.header(key, value);
        }
    }

    send(app, request.body(body).unwrap()).await
}

/// Sends a raw, possibly malformed, JSON body.
pub async fn raw_request(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, body, _) = send(app, request).await;
    (status, body)
}

pub fn json(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

/// All `Set-Cookie` headers of a response, parsed.
pub fn set_cookies(headers: &HeaderMap) -> Vec<Cookie<'static>> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| Cookie::parse(v.to_string()).ok())
        .collect()
}

pub fn find_cookie(headers: &HeaderMap, name: &str) -> Option<Cookie<'static>> {
    set_cookies(headers).into_iter().find(|c| c.name() == name)
}

/// Logs in over HTTP and returns the response body and headers.
pub async fn login(app: Router, username: &str) -> (Value, HeaderMap) {
    let (status, body, headers) = test_request(
        app,
        "POST",
        "/auth/login",
        Some(serde_json::json!({ "username": username, "password": TEST_PASSWORD })),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    (json(&body), headers)
}
