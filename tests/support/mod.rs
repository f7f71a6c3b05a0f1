#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use forgeworks::{AppState, ServerConfig, router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

/// Router over a fresh in-memory store, plus the state behind it.
pub fn test_app() -> (Router, Arc<AppState>) {
    let config = ServerConfig {
        password_hash_cost: 4,
        ..ServerConfig::in_memory()
    };
    let state = Arc::new(AppState::new(Arc::new(config)).expect("in-memory state"));
    (router(state.clone()), state)
}

/// Router over a database file in `dir`.
pub fn file_app(dir: &std::path::Path) -> (Router, Arc<AppState>) {
    let config = ServerConfig {
        database_path: dir.join("forgeworks.db"),
        password_hash_cost: 4,
        ..ServerConfig::default()
    };
    let state = Arc::new(AppState::new(Arc::new(config)).expect("file-backed state"));
    (router(state.clone()), state)
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

pub async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

/// Adds the two products most tests order from.
pub async fn seed_catalog(app: &Router) {
    for product in [
        json!({"id": "claw-hammer", "name": "Claw Hammer", "price": 249.99, "category": "Hand Tools"}),
        json!({"id": "angle-grinder", "name": "Angle Grinder", "price": 899.5, "category": "Power Tools"}),
    ] {
        let (status, body) = post(app, "/api/products", product).await;
        assert_eq!(status, StatusCode::CREATED, "seed failed: {body}");
    }
}

pub fn order_body(id: &str, email: &str) -> Value {
    json!({
        "id": id,
        "customer_name": "Sarah Johnson",
        "customer_email": email,
        "customer_phone": "+27 82 123 4567",
        "customer_address": "12 Forge Street, Cape Town",
        "delivery_option": "express",
        "total": 1399.48,
        "items": [
            {"product_id": "claw-hammer", "quantity": 2, "price": 249.99},
            {"product_id": "angle-grinder", "quantity": 1, "price": 899.5}
        ]
    })
}

pub async fn count_rows(state: &AppState, table: &'static str) -> i64 {
    state
        .store
        .call("count_rows", move |conn| {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        })
        .await
        .expect("count")
}
