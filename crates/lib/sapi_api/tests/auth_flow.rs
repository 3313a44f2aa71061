//! Integration tests: build the router over an in-memory store and drive it
//! with `oneshot` requests.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use sapi_api::{AppState, config::ApiConfig};
use sapi_core::store::MemoryStore;
use serde_json::{Value, json};
use tower::ServiceExt;

fn config(secret: &str) -> ApiConfig {
    ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        pg_connection_url: String::new(),
        jwt_secret: secret.into(),
        access_token_ttl_secs: 900,
        refresh_token_ttl_secs: 3600,
        store_timeout_ms: 1000,
        bcrypt_cost: 4,
    }
}

fn app() -> Router {
    let state = AppState::new(Arc::new(MemoryStore::new()), config("test-secret")).unwrap();
    sapi_api::router(state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn signup(app: &Router, login: &str) -> Value {
    let (status, user) = send(
        app,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({
            "login": login,
            "username": login,
            "password": "secret1",
            "email": format!("{login}@example.com"),
        })),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status, "signup {login}: {user}");
    user
}

/// Returns `(access, refresh)`.
async fn signin(app: &Router, login: &str) -> (String, String) {
    let (status, tokens) = send(
        app,
        Method::POST,
        "/auth/signin",
        None,
        Some(json!({"login": login, "password": "secret1"})),
    )
    .await;
    assert_eq!(StatusCode::OK, status, "signin {login}: {tokens}");
    (
        tokens["accessToken"].as_str().unwrap().to_string(),
        tokens["refreshToken"].as_str().unwrap().to_string(),
    )
}

async fn refresh(app: &Router, refresh_token: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/auth/refresh",
        None,
        Some(json!({"refreshToken": refresh_token})),
    )
    .await
}

#[tokio::test]
async fn first_user_is_admin_and_duplicates_conflict() {
    let app = app();
    let alice = signup(&app, "alice").await;
    assert_eq!(json!(["USER", "ADMIN"]), alice["roles"]);
    assert_eq!(false, alice["isBlocked"]);
    assert!(alice.get("passwordHash").is_none());

    let bob = signup(&app, "bob").await;
    assert_eq!(json!(["USER"]), bob["roles"]);

    let (status, _) = send(
        &app,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({
            "login": "bob",
            "username": "bobby",
            "password": "secret1",
            "email": "other@example.com",
        })),
    )
    .await;
    assert_eq!(StatusCode::CONFLICT, status);

    let (status, body) = send(
        &app,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({
            "login": "carol",
            "username": "carol",
            "password": "123",
            "email": "carol@example.com",
        })),
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
    assert_eq!("validation_error", body["error"]);
}

#[tokio::test]
async fn wrong_password_and_unknown_login_are_indistinguishable() {
    let app = app();
    signup(&app, "alice").await;

    let wrong = send(
        &app,
        Method::POST,
        "/auth/signin",
        None,
        Some(json!({"login": "alice", "password": "nottheone"})),
    )
    .await;
    let unknown = send(
        &app,
        Method::POST,
        "/auth/signin",
        None,
        Some(json!({"login": "nobody", "password": "nottheone"})),
    )
    .await;

    assert_eq!(StatusCode::UNAUTHORIZED, wrong.0);
    assert_eq!(wrong, unknown);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_signups_create_one_admin() {
    let app = app();
    let logins = ["anna", "bert", "carl", "dora", "emil", "fred", "gina", "hugo"];

    let handles: Vec<_> = logins
        .into_iter()
        .map(|login| {
            let app = app.clone();
            tokio::spawn(async move { signup(&app, login).await })
        })
        .collect();

    let mut admins = 0;
    for handle in handles {
        let user = handle.await.unwrap();
        if user["roles"].as_array().unwrap().contains(&json!("ADMIN")) {
            admins += 1;
        }
    }
    assert_eq!(1, admins);
}

#[tokio::test]
async fn token_pair_uses_camel_case_keys() {
    let app = app();
    signup(&app, "alice").await;

    let (status, tokens) = send(
        &app,
        Method::POST,
        "/auth/signin",
        None,
        Some(json!({"login": "alice", "password": "secret1"})),
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    let mut keys: Vec<_> = tokens.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(vec!["accessToken", "refreshToken"], keys);

    let refresh_token = tokens["refreshToken"].as_str().unwrap();
    let (status, _) = send(
        &app,
        Method::POST,
        "/auth/refresh",
        None,
        Some(json!({"refresh": refresh_token})),
    )
    .await;
    assert_eq!(StatusCode::UNPROCESSABLE_ENTITY, status);

    let (status, rotated) = refresh(&app, refresh_token).await;
    assert_eq!(StatusCode::OK, status, "{rotated}");
    assert!(rotated["accessToken"].is_string());
    assert!(rotated["refreshToken"].is_string());
}

#[tokio::test]
async fn identity_is_checked_before_the_path() {
    let app = app();
    signup(&app, "alice").await;
    let (access, _) = signin(&app, "alice").await;

    let (status, body) = send(&app, Method::GET, "/users/abc", None, None).await;
    assert_eq!(StatusCode::UNAUTHORIZED, status);
    assert_eq!("Invalid token", body["message"]);

    let (status, _) = send(&app, Method::GET, "/users/abc", Some(&access), None).await;
    assert_eq!(StatusCode::BAD_REQUEST, status);
}

#[tokio::test]
async fn every_bad_token_gets_the_same_401() {
    let app = app();
    signup(&app, "alice").await;
    let (access, _) = signin(&app, "alice").await;

    let (status, _) = send(&app, Method::GET, "/user/profile", Some(&access), None).await;
    assert_eq!(StatusCode::OK, status);

    // Same claims, different signing key.
    let foreign = {
        let other = AppState::new(Arc::new(MemoryStore::new()), config("other-secret")).unwrap();
        let other_app = sapi_api::router(other);
        signup(&other_app, "alice").await;
        signin(&other_app, "alice").await.0
    };

    let missing = send(&app, Method::GET, "/user/profile", None, None).await;
    let garbage = send(&app, Method::GET, "/user/profile", Some("garbage"), None).await;
    let forged = send(&app, Method::GET, "/user/profile", Some(&foreign), None).await;

    assert_eq!(StatusCode::UNAUTHORIZED, missing.0);
    assert_eq!("Invalid token", missing.1["message"]);
    assert_eq!(missing, garbage);
    assert_eq!(missing, forged);
}

#[tokio::test]
async fn logout_kills_access_and_refresh_tokens() {
    let app = app();
    signup(&app, "alice").await;
    let (access, refresh_token) = signin(&app, "alice").await;

    let (status, body) = send(&app, Method::POST, "/auth/logout", Some(&access), None).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(Value::Null, body);

    let (status, body) = send(&app, Method::GET, "/user/profile", Some(&access), None).await;
    assert_eq!(StatusCode::UNAUTHORIZED, status);
    assert_eq!("Invalid token", body["message"]);

    let (status, body) = refresh(&app, &refresh_token).await;
    assert_eq!(StatusCode::UNAUTHORIZED, status);
    assert_eq!("session_expired", body["error"]);

    // Signing in again works.
    let (access, _) = signin(&app, "alice").await;
    let (status, _) = send(&app, Method::GET, "/user/profile", Some(&access), None).await;
    assert_eq!(StatusCode::OK, status);
}

#[tokio::test]
async fn superseded_refresh_token_is_rejected_distinctly() {
    let app = app();
    signup(&app, "alice").await;
    let (_, first) = signin(&app, "alice").await;
    let (_, second) = signin(&app, "alice").await;

    let (status, body) = refresh(&app, &first).await;
    assert_eq!(StatusCode::UNAUTHORIZED, status);
    assert_eq!("unauthorized", body["error"]);
    assert_eq!("Invalid refresh token", body["message"]);

    let (status, tokens) = refresh(&app, &second).await;
    assert_eq!(StatusCode::OK, status);
    assert_ne!(second, tokens["refreshToken"].as_str().unwrap());

    // Refresh is single-use.
    let (status, _) = refresh(&app, &second).await;
    assert_eq!(StatusCode::UNAUTHORIZED, status);

    let (status, body) = refresh(&app, "not-a-token").await;
    assert_eq!(StatusCode::UNAUTHORIZED, status);
    assert_eq!("session_expired", body["error"]);
}

#[tokio::test]
async fn granted_role_applies_after_refresh() {
    let app = app();
    let _alice = signup(&app, "alice").await;
    let bob = signup(&app, "bob").await;
    let bob_id = bob["id"].as_i64().unwrap();
    let (admin, _) = signin(&app, "alice").await;
    let (bob_access, bob_refresh) = signin(&app, "bob").await;

    let (status, body) = send(&app, Method::GET, "/admin/users", Some(&bob_access), None).await;
    assert_eq!(StatusCode::FORBIDDEN, status);
    assert_eq!("not enough rights", body["message"]);

    let (status, updated) = send(
        &app,
        Method::POST,
        &format!("/admin/users/{bob_id}/rights"),
        Some(&admin),
        Some(json!({"roles": ["MODERATOR"]})),
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(json!(["USER", "MODERATOR"]), updated["roles"]);

    // The old token is a snapshot.
    let (status, _) = send(&app, Method::GET, "/admin/users", Some(&bob_access), None).await;
    assert_eq!(StatusCode::FORBIDDEN, status);

    let (_, tokens) = refresh(&app, &bob_refresh).await;
    let bob_access = tokens["accessToken"].as_str().unwrap().to_string();

    let (status, list) = send(&app, Method::GET, "/admin/users", Some(&bob_access), None).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(2, list["meta"]["totalAmount"]);
    assert_eq!(2, list["data"].as_array().unwrap().len());

    // Moderator is not admin.
    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/admin/users/{bob_id}"),
        Some(&bob_access),
        None,
    )
    .await;
    assert_eq!(StatusCode::FORBIDDEN, status);
}

#[tokio::test]
async fn blocked_admin_is_treated_as_plain_user() {
    let app = app();
    signup(&app, "alice").await;
    let bob = signup(&app, "bob").await;
    let bob_id = bob["id"].as_i64().unwrap();
    let (admin, _) = signin(&app, "alice").await;

    send(
        &app,
        Method::POST,
        &format!("/admin/users/{bob_id}/rights"),
        Some(&admin),
        Some(json!({"roles": ["ADMIN"]})),
    )
    .await;
    let (bob_access, _) = signin(&app, "bob").await;
    let (status, _) = send(&app, Method::GET, "/admin/users", Some(&bob_access), None).await;
    assert_eq!(StatusCode::OK, status);

    let (status, blocked) = send(
        &app,
        Method::POST,
        &format!("/admin/users/{bob_id}/block"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(true, blocked["isBlocked"]);

    // Same token, next request.
    let (status, _) = send(&app, Method::GET, "/admin/users", Some(&bob_access), None).await;
    assert_eq!(StatusCode::FORBIDDEN, status);
    let (status, _) = send(&app, Method::GET, "/user/profile", Some(&bob_access), None).await;
    assert_eq!(StatusCode::OK, status);

    // A fresh sign-in is also reduced.
    let (bob_access, _) = signin(&app, "bob").await;
    let (status, _) = send(&app, Method::GET, "/admin/users", Some(&bob_access), None).await;
    assert_eq!(StatusCode::FORBIDDEN, status);
}

#[tokio::test]
async fn user_by_id_is_self_only() {
    let app = app();
    let alice = signup(&app, "alice").await;
    let bob = signup(&app, "bob").await;
    let (admin, _) = signin(&app, "alice").await;
    let (bob_access, _) = signin(&app, "bob").await;

    let alice_uri = format!("/users/{}", alice["id"]);
    let bob_uri = format!("/users/{}", bob["id"]);

    let (status, _) = send(&app, Method::GET, &bob_uri, Some(&bob_access), None).await;
    assert_eq!(StatusCode::OK, status);
    let (status, _) = send(&app, Method::GET, &alice_uri, Some(&bob_access), None).await;
    assert_eq!(StatusCode::FORBIDDEN, status);

    // Roles do not widen a self-only capability.
    let (status, _) = send(&app, Method::GET, &bob_uri, Some(&admin), None).await;
    assert_eq!(StatusCode::FORBIDDEN, status);
}

#[tokio::test]
async fn todos_belong_to_their_owner() {
    let app = app();
    signup(&app, "alice").await;
    signup(&app, "bob").await;
    let (alice, _) = signin(&app, "alice").await;
    let (bob, _) = signin(&app, "bob").await;

    let (status, todo) = send(
        &app,
        Method::POST,
        "/todos",
        Some(&bob),
        Some(json!({"title": "water plants"})),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status);
    assert_eq!(false, todo["isDone"]);
    let uri = format!("/todos/{}", todo["id"]);

    let (status, _) = send(&app, Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(StatusCode::FORBIDDEN, status);
    let (status, _) = send(&app, Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(StatusCode::FORBIDDEN, status);

    let (status, list) = send(&app, Method::GET, "/todos", Some(&alice), None).await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(0, list["info"]["all"]);

    let (status, updated) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&bob),
        Some(json!({"isDone": true})),
    )
    .await;
    assert_eq!(StatusCode::OK, status);
    assert_eq!(true, updated["isDone"]);
    assert_eq!("water plants", updated["title"]);

    let (_, list) = send(&app, Method::GET, "/todos?filter=completed", Some(&bob), None).await;
    assert_eq!(1, list["meta"]["totalAmount"]);
    assert_eq!(json!({"all": 1, "completed": 1, "inWork": 0}), list["info"]);
    let (_, list) = send(&app, Method::GET, "/todos?filter=inWork", Some(&bob), None).await;
    assert_eq!(0, list["meta"]["totalAmount"]);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&bob), None).await;
    assert_eq!(StatusCode::OK, status);
    let (status, _) = send(&app, Method::GET, &uri, Some(&bob), None).await;
    assert_eq!(StatusCode::NOT_FOUND, status);
}

#[tokio::test]
async fn cors_preflight_needs_no_token() {
    let app = app();
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/user/profile")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.expect("request");
    assert_eq!(StatusCode::OK, resp.status());
    assert!(resp.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
