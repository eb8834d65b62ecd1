use axum::http::StatusCode;
use serde_json::json;

use super::helpers::{
    TEST_PASSWORD, bearer, create_test_app, create_user, find_cookie, json, jwt_service, login,
    raw_request, set_cookies, setup_test_db, test_db, test_request,
};
use crate::config::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::models::jwt::AccessClaims;
use crate::models::user::User;

fn signup_payload() -> serde_json::Value {
    json!({
        "email": "test@example.com",
        "username": "test",
        "name": "Test",
        "password": "abcdefghijkl"
    })
}

#[tokio::test]
async fn test_signup_success() {
    let pool = setup_test_db().await;
    let app = create_test_app(pool);

    let (status, body, _) =
        test_request(app, "POST", "/auth/signup", Some(signup_payload()), None, None).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let response = json(&body);
    assert_eq!(response["username"], "test");
    assert_eq!(response["email"], "test@example.com");
    assert_eq!(response["roles"], json!(["user"]));
    assert!(response.get("password_hash").is_none());
    assert!(response["href"].as_str().unwrap().ends_with(response["id"].as_str().unwrap()));
}

#[tokio::test]
async fn test_signup_duplicate_is_conflict() {
    let pool = setup_test_db().await;
    let app = create_test_app(pool);

    let (status, _, _) = test_request(
        app.clone(),
        "POST",
        "/auth/signup",
        Some(signup_payload()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mut payload = signup_payload();
    payload["username"] = json!("other");
    let (status, body, _) =
        test_request(app, "POST", "/auth/signup", Some(payload), None, None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json(&body)["error"], "conflict");
}

#[tokio::test]
async fn test_signup_invalid_payload() {
    let pool = setup_test_db().await;
    let app = create_test_app(pool);

    let (status, _, _) = test_request(
        app.clone(),
        "POST",
        "/auth/signup",
        Some(json!({ "invalid": "key" })),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let mut payload = signup_payload();
    payload["password"] = json!("short");
    let (status, body, _) =
        test_request(app.clone(), "POST", "/auth/signup", Some(payload), None, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json(&body)["details"].get("password").is_some());

    let mut payload = signup_payload();
    payload["username"] = json!("has space");
    let (status, _, _) =
        test_request(app, "POST", "/auth/signup", Some(payload), None, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let pool = setup_test_db().await;
    let app = create_test_app(pool);

    let (status, body) = raw_request(app, "POST", "/auth/signup", "{not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Request malformed"));
}

#[tokio::test]
async fn test_login_success_sets_cookies() {
    let pool = setup_test_db().await;
    let db = test_db(&pool);
    let user = create_user(&db, "alice", &["user"]).await;
    let app = create_test_app(pool.clone());

    let (status, body, headers) = test_request(
        app,
        "POST",
        "/auth/login",
        Some(json!({ "email": "alice@example.com", "password": TEST_PASSWORD })),
        None,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let response = json(&body);
    assert_eq!(response["token_type"], "Bearer");
    assert_eq!(response["expires_in"], 600);
    assert!(response["refresh_token"].is_string());

    let access_token = response["access_token"].as_str().unwrap();
    let claims: AccessClaims = jwt_service().validate_access(access_token).unwrap();
    assert_eq!(claims.sub, user.id);

    // exactly the two auth cookies while CSRF is off
    assert_eq!(set_cookies(&headers).len(), 2);
    let access_cookie = find_cookie(&headers, ACCESS_TOKEN_COOKIE).unwrap();
    assert_eq!(access_cookie.value(), access_token);
    assert_eq!(access_cookie.http_only(), Some(true));
    assert_eq!(access_cookie.secure(), Some(true));
    assert_eq!(access_cookie.path(), Some("/"));
    assert!(find_cookie(&headers, REFRESH_TOKEN_COOKIE).is_some());

    let stored = User::find_by_id(&db, &user.id).await.unwrap().unwrap();
    assert!(stored.refresh_token_id.is_some());
    assert!(stored.last_login_at.is_some());
}

#[tokio::test]
async fn test_login_by_username() {
    let pool = setup_test_db().await;
    create_user(&test_db(&pool), "bob", &["user"]).await;
    let app = create_test_app(pool);

    let (body, _) = login(app, "bob").await;
    assert!(body["access_token"].is_string());
}

#[tokio::test]
async fn test_login_wrong_password() {
    let pool = setup_test_db().await;
    create_user(&test_db(&pool), "alice", &["user"]).await;
    let app = create_test_app(pool);

    for payload in [
        json!({ "email": "alice@example.com", "password": "wrong-password" }),
        json!({ "email": "nobody@example.com", "password": TEST_PASSWORD }),
    ] {
        let (status, body, headers) =
            test_request(app.clone(), "POST", "/auth/login", Some(payload), None, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Invalid email or password"));
        assert!(set_cookies(&headers).is_empty());
    }
}

#[tokio::test]
async fn test_refresh_with_cookie() {
    let pool = setup_test_db().await;
    create_user(&test_db(&pool), "alice", &["user"]).await;
    let app = create_test_app(pool);

    let (tokens, _) = login(app.clone(), "alice").await;
    let refresh_token = tokens["refresh_token"].as_str().unwrap();

    let (status, body, headers) = test_request(
        app,
        "POST",
        "/auth/refresh",
        None,
        None,
        Some(&[(REFRESH_TOKEN_COOKIE, refresh_token)]),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    for field in ["access_token", "expires_in", "refresh_token", "token_type"] {
        assert!(body.contains(field));
    }
    assert!(find_cookie(&headers, ACCESS_TOKEN_COOKIE).is_some());
    assert!(find_cookie(&headers, REFRESH_TOKEN_COOKIE).is_some());
}

#[tokio::test]
async fn test_refresh_with_body() {
    let pool = setup_test_db().await;
    create_user(&test_db(&pool), "alice", &["user"]).await;
    let app = create_test_app(pool);

    let (tokens, _) = login(app.clone(), "alice").await;

    let (status, body, _) = test_request(
        app,
        "POST",
        "/auth/refresh",
        Some(json!({ "refresh_token": tokens["refresh_token"] })),
        None,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_ne!(json(&body)["refresh_token"], tokens["refresh_token"]);
}

#[tokio::test]
async fn test_refresh_missing_token() {
    let pool = setup_test_db().await;
    let app = create_test_app(pool);

    let (status, body, _) =
        test_request(app.clone(), "POST", "/auth/refresh", None, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Request malformed"));

    let (status, body) = raw_request(app, "POST", "/auth/refresh", "{\"refresh").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Request malformed"));
}

#[tokio::test]
async fn test_refresh_invalid_token() {
    let pool = setup_test_db().await;
    create_user(&test_db(&pool), "alice", &["user"]).await;
    let app = create_test_app(pool);

    let (status, body, _) = test_request(
        app.clone(),
        "POST",
        "/auth/refresh",
        None,
        None,
        Some(&[(REFRESH_TOKEN_COOKIE, "invalid")]),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Token invalid"));

    // an access token is not a refresh token
    let (tokens, _) = login(app.clone(), "alice").await;
    let (status, body, _) = test_request(
        app,
        "POST",
        "/auth/refresh",
        Some(json!({ "refresh_token": tokens["access_token"] })),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Token invalid"));
}

#[tokio::test]
async fn test_refresh_token_is_rotated() {
    let pool = setup_test_db().await;
    create_user(&test_db(&pool), "alice", &["user"]).await;
    let app = create_test_app(pool);

    let (tokens, _) = login(app.clone(), "alice").await;
    let first = json!({ "refresh_token": tokens["refresh_token"] });

    let (status, _, _) = test_request(
        app.clone(),
        "POST",
        "/auth/refresh",
        Some(first.clone()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) =
        test_request(app, "POST", "/auth/refresh", Some(first), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Token mismatch"));
}

#[tokio::test]
async fn test_logout_clears_refresh_token() {
    let pool = setup_test_db().await;
    let db = test_db(&pool);
    let user = create_user(&db, "alice", &["user"]).await;
    let app = create_test_app(pool);

    let (tokens, _) = login(app.clone(), "alice").await;
    let access_token = tokens["access_token"].as_str().unwrap();

    let (status, _, headers) = test_request(
        app.clone(),
        "POST",
        "/auth/logout",
        None,
        Some(bearer(access_token)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let cleared = find_cookie(&headers, ACCESS_TOKEN_COOKIE).unwrap();
    assert_eq!(cleared.value(), "");
    assert_eq!(cleared.max_age(), Some(time::Duration::ZERO));

    let stored = User::find_by_id(&db, &user.id).await.unwrap().unwrap();
    assert!(stored.refresh_token_id.is_none());

    let (status, body, _) = test_request(
        app,
        "POST",
        "/auth/refresh",
        Some(json!({ "refresh_token": tokens["refresh_token"] })),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Token mismatch"));
}

#[tokio::test]
async fn test_logout_requires_token() {
    let pool = setup_test_db().await;
    let app = create_test_app(pool);

    let (status, body, _) = test_request(app, "POST", "/auth/logout", None, None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Token missing"));
}

#[tokio::test]
async fn test_invalid_authorization_header() {
    let pool = setup_test_db().await;
    let app = create_test_app(pool);

    let mut headers = axum::http::HeaderMap::new();
    headers.insert("authorization", "Basic dXNlcjpwYXNz".parse().unwrap());

    let (status, body, _) = test_request(app, "GET", "/user", None, Some(headers), None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Invalid authorization header"));
}

#[tokio::test]
async fn test_access_token_from_cookie() {
    let pool = setup_test_db().await;
    create_user(&test_db(&pool), "alice", &["user"]).await;
    let app = create_test_app(pool);

    let (tokens, _) = login(app.clone(), "alice").await;
    let access_token = tokens["access_token"].as_str().unwrap();

    let (status, body, _) = test_request(
        app,
        "GET",
        "/user",
        None,
        None,
        Some(&[(ACCESS_TOKEN_COOKIE, access_token)]),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json(&body)["username"], "alice");
}

#[tokio::test]
async fn test_expired_and_tampered_tokens() {
    let pool = setup_test_db().await;
    let user = create_user(&test_db(&pool), "alice", &["user"]).await;
    let app = create_test_app(pool);

    let expired = jwt_service()
        .issue_personal_token(
            &user.id,
            user.roles(),
            "some-id",
            chrono::Utc::now() - chrono::Duration::minutes(1),
        )
        .unwrap();
    let (status, body, _) =
        test_request(app.clone(), "GET", "/user", None, Some(bearer(&expired)), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Token expired"));

    let (status, body, _) =
        test_request(app, "GET", "/user", None, Some(bearer("a.b.c")), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Token invalid"));
}
