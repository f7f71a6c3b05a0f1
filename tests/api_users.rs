mod support;

use axum::http::StatusCode;
use serde_json::json;
use support::*;

fn registration(email: &str) -> serde_json::Value {
    json!({
        "name": "Mike Wilson",
        "email": email,
        "phone": "+27 83 234 5678",
        "password": "password123",
        "role": "supplier"
    })
}

#[tokio::test]
async fn register_and_login() {
    let (app, _state) = test_app();

    let (status, user) = post(&app, "/api/register", registration("mike@email.com")).await;
    assert_eq!(status, StatusCode::CREATED, "{user}");
    assert_eq!(user["role"], "supplier");
    assert!(user.get("password").is_none());
    let id = user["id"].as_i64().unwrap();

    let (status, session) = post(
        &app,
        "/api/login",
        json!({"email": "mike@email.com", "password": "password123"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["user"]["id"], id);
    assert_eq!(session["token"].as_str().unwrap().len(), 32);
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() {
    let (app, _state) = test_app();
    post(&app, "/api/register", registration("mike@email.com")).await;

    let (status, wrong_password) = post(
        &app,
        "/api/login",
        json!({"email": "mike@email.com", "password": "guess"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, unknown_email) = post(
        &app,
        "/api/login",
        json!({"email": "ghost@email.com", "password": "password123"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_email);
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let (app, state) = test_app();
    let (status, _) = post(&app, "/api/register", registration("dup@email.com")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, error) = post(&app, "/api/register", registration("dup@email.com")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "email dup@email.com is already registered");
    assert_eq!(count_rows(&state, "users").await, 1);
}

#[tokio::test]
async fn register_requires_fields() {
    let (app, _state) = test_app();
    let (status, error) = post(&app, "/api/register", json!({"email": "a@email.com"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "missing required fields");
}

#[tokio::test]
async fn user_lifecycle() {
    let (app, _state) = test_app();
    let (_, user) = post(&app, "/api/register", registration("emily@email.com")).await;
    let id = user["id"].as_i64().unwrap();

    let (status, listed) = get(&app, "/api/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, fetched) = get(&app, &format!("/api/users/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, user);

    let (status, updated) = post(
        &app,
        "/api/users/update",
        json!({"id": id, "name": "Emily Davis", "email": "emily@email.com", "password": "rotated"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Emily Davis");

    let (status, _) = post(
        &app,
        "/api/login",
        json!({"email": "emily@email.com", "password": "rotated"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(&app, "/api/users/delete", json!({"id": id})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let (status, _) = get(&app, &format!("/api/users/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = post(&app, "/api/users/delete", json!({"id": id})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_numeric_user_id_is_a_bad_request() {
    let (app, _state) = test_app();
    let (status, error) = get(&app, "/api/users/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].is_string());
}

#[tokio::test]
async fn stored_password_is_a_bcrypt_hash() {
    let (app, state) = test_app();
    post(&app, "/api/register", registration("hash@email.com")).await;

    let (_, stored) = state
        .store
        .call("find_credentials", |conn| {
            forgeworks::store::users::find_credentials(conn, "hash@email.com")
        })
        .await
        .unwrap()
        .unwrap();
    assert!(stored.starts_with("$2b$04$"), "{stored}");
    assert!(!stored.contains("password123"));
}
