use axum::http::{HeaderMap, HeaderValue, StatusCode};
use cookie::SameSite;
use serde_json::json;

use super::helpers::{
    bearer, create_test_app_with_config, create_user, find_cookie, login, setup_test_db,
    test_config, test_db, test_request,
};
use crate::config::{ACCESS_TOKEN_COOKIE, CSRF_HEADER, CSRF_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};

/// Logs alice in with CSRF enabled and returns (access token, csrf token).
async fn cookie_session(app: axum::Router) -> (String, String) {
    let (_, headers) = login(app, "alice").await;

    let access = find_cookie(&headers, ACCESS_TOKEN_COOKIE).unwrap();
    let csrf = find_cookie(&headers, CSRF_TOKEN_COOKIE).unwrap();
    // readable by scripts so it can be echoed back
    assert_ne!(csrf.http_only(), Some(true));

    (access.value().to_string(), csrf.value().to_string())
}

fn csrf_header(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CSRF_HEADER, HeaderValue::from_str(value).unwrap());
    headers
}

async fn app() -> axum::Router {
    let pool = setup_test_db().await;
    create_user(&test_db(&pool), "alice", &["user"]).await;
    create_test_app_with_config(pool, test_config(true))
}

#[tokio::test]
async fn test_cookie_post_requires_csrf_header() {
    let app = app().await;
    let (access, _) = cookie_session(app.clone()).await;

    let (status, body, _) = test_request(
        app,
        "POST",
        "/tasks",
        Some(json!({ "title": "write docs" })),
        None,
        Some(&[(ACCESS_TOKEN_COOKIE, &access)]),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Missing CSRF token header"));
}

#[tokio::test]
async fn test_cookie_post_with_valid_csrf_token() {
    let app = app().await;
    let (access, csrf) = cookie_session(app.clone()).await;

    let (status, body, _) = test_request(
        app,
        "POST",
        "/tasks",
        Some(json!({ "title": "write docs" })),
        Some(csrf_header(&csrf)),
        Some(&[(ACCESS_TOKEN_COOKIE, &access)]),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn test_cookie_post_with_wrong_csrf_token() {
    let app = app().await;
    let (access, _) = cookie_session(app.clone()).await;

    let (status, body, _) = test_request(
        app,
        "POST",
        "/tasks",
        Some(json!({ "title": "write docs" })),
        Some(csrf_header("bm90LXRoZS1yaWdodC1tYWM")),
        Some(&[(ACCESS_TOKEN_COOKIE, &access)]),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("Invalid CSRF token"));
}

#[tokio::test]
async fn test_cookie_get_needs_no_csrf_token() {
    let app = app().await;
    let (access, _) = cookie_session(app.clone()).await;

    let (status, _, _) = test_request(
        app,
        "GET",
        "/tasks",
        None,
        None,
        Some(&[(ACCESS_TOKEN_COOKIE, &access)]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_bearer_post_needs_no_csrf_token() {
    let app = app().await;
    let (tokens, _) = login(app.clone(), "alice").await;

    let (status, _, _) = test_request(
        app,
        "POST",
        "/tasks",
        Some(json!({ "title": "write docs" })),
        Some(bearer(tokens["access_token"].as_str().unwrap())),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_clears_csrf_cookie() {
    let app = app().await;
    let (access, csrf) = cookie_session(app.clone()).await;

    let (status, _, headers) = test_request(
        app,
        "POST",
        "/auth/logout",
        None,
        Some(csrf_header(&csrf)),
        Some(&[(ACCESS_TOKEN_COOKIE, &access)]),
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(find_cookie(&headers, CSRF_TOKEN_COOKIE).unwrap().value(), "");
}

#[tokio::test]
async fn test_cookie_refresh_relies_on_same_site() {
    let app = app().await;
    let (_, headers) = login(app.clone(), "alice").await;

    let refresh = find_cookie(&headers, REFRESH_TOKEN_COOKIE).unwrap();
    assert_eq!(refresh.same_site(), Some(SameSite::Strict));
    assert_eq!(refresh.http_only(), Some(true));

    // no CSRF header is expected on refresh
    let (status, body, headers) = test_request(
        app,
        "POST",
        "/auth/refresh",
        None,
        None,
        Some(&[(REFRESH_TOKEN_COOKIE, refresh.value())]),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(find_cookie(&headers, CSRF_TOKEN_COOKIE).is_some());
}
