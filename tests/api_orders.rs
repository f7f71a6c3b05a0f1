mod support;

use axum::http::StatusCode;
use serde_json::{Value, json};
use support::*;
use tokio::task::JoinSet;

#[tokio::test]
async fn create_then_get_returns_same_order() {
    let (app, _state) = test_app();
    seed_catalog(&app).await;

    let (status, created) = post(&app, "/api/orders", order_body("FW-1001", "sarah@email.com")).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["status"], "Pending");
    assert_eq!(created["delivery_option"], "express");
    assert!(created["created_at"].as_str().unwrap().ends_with('Z'));

    let (status, fetched) = get(&app, "/api/orders/FW-1001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], "FW-1001");
    assert_eq!(fetched["customer_email"], "sarah@email.com");
    assert_eq!(fetched["total"], json!(1399.48));
    assert_eq!(fetched["created_at"], created["created_at"]);

    let items = fetched["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["product_id"], "claw-hammer");
    assert_eq!(items[0]["name"], "Claw Hammer");
    assert_eq!(items[0]["quantity"], 2);
    assert_eq!(items[0]["price"], json!(249.99));
    assert_eq!(items[1]["product_id"], "angle-grinder");
    assert_eq!(items[1]["name"], "Angle Grinder");
}

#[tokio::test]
async fn total_is_stored_verbatim() {
    let (app, _state) = test_app();
    seed_catalog(&app).await;

    let mut body = order_body("FW-1002", "sarah@email.com");
    body["total"] = json!(5.0);
    let (status, _) = post(&app, "/api/orders", body).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, fetched) = get(&app, "/api/orders/FW-1002").await;
    assert_eq!(fetched["total"], json!(5.0));
}

#[tokio::test]
async fn empty_items_is_rejected_without_writing() {
    let (app, state) = test_app();
    seed_catalog(&app).await;

    let mut body = order_body("FW-2001", "sarah@email.com");
    body["items"] = json!([]);
    let (status, error) = post(&app, "/api/orders", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "missing required fields");
    assert_eq!(count_rows(&state, "orders").await, 0);
    assert_eq!(count_rows(&state, "order_items").await, 0);
}

#[tokio::test]
async fn unknown_products_are_named_and_nothing_is_written() {
    let (app, state) = test_app();
    seed_catalog(&app).await;

    let mut body = order_body("FW-2002", "sarah@email.com");
    body["items"] = json!([
        {"product_id": "laser-level", "quantity": 1, "price": 10.0},
        {"product_id": "claw-hammer", "quantity": 1, "price": 249.99},
        {"product_id": "drill-press", "quantity": 1, "price": 10.0},
        {"product_id": "laser-level", "quantity": 2, "price": 10.0}
    ]);
    let (status, error) = post(&app, "/api/orders", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "invalid product ids: drill-press, laser-level");
    assert_eq!(count_rows(&state, "orders").await, 0);
    assert_eq!(count_rows(&state, "order_items").await, 0);
}

#[tokio::test]
async fn line_validation_names_the_offending_item() {
    let (app, _state) = test_app();
    seed_catalog(&app).await;

    let cases = [
        (json!({"product_id": "", "quantity": 1, "price": 1.0}), "items[0].product_id must be a non-empty string"),
        (json!({"product_id": "claw-hammer", "quantity": 0, "price": 1.0}), "items[0].quantity must be a positive integer"),
        (json!({"product_id": "claw-hammer", "quantity": 1, "price": -3}), "items[0].price must be a positive number"),
    ];
    for (item, message) in cases {
        let mut body = order_body("FW-2003", "sarah@email.com");
        body["items"] = json!([item]);
        let (status, error) = post(&app, "/api/orders", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], message);
    }
}

#[tokio::test]
async fn unknown_enum_values_are_rejected() {
    let (app, _state) = test_app();
    seed_catalog(&app).await;

    let mut body = order_body("FW-2004", "sarah@email.com");
    body["delivery_option"] = json!("drone");
    let (status, error) = post(&app, "/api/orders", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].as_str().unwrap().contains("drone"));
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let (app, state) = test_app();
    let (status, error) = send(
        &app,
        axum::http::Method::POST,
        "/api/orders",
        Some(Value::String("not an object".into())),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].is_string());
    assert_eq!(count_rows(&state, "orders").await, 0);
}

#[tokio::test]
async fn duplicate_order_id_conflicts() {
    let (app, state) = test_app();
    seed_catalog(&app).await;

    let (status, _) = post(&app, "/api/orders", order_body("FW-3001", "a@email.com")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, error) = post(&app, "/api/orders", order_body("FW-3001", "b@email.com")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "order FW-3001 already exists");
    assert_eq!(count_rows(&state, "order_items").await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_are_all_fully_visible() {
    let (app, _state) = test_app();
    seed_catalog(&app).await;

    let mut tasks = JoinSet::new();
    for n in 0..16 {
        let app = app.clone();
        tasks.spawn(async move {
            let id = format!("FW-C{n:02}");
            let (status, _) = post(&app, "/api/orders", order_body(&id, "bulk@email.com")).await;
            assert_eq!(status, StatusCode::CREATED);
            id
        });
    }
    let mut ids = Vec::new();
    while let Some(id) = tasks.join_next().await {
        ids.push(id.unwrap());
    }

    for id in &ids {
        let (status, order) = get(&app, &format!("/api/orders/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["items"].as_array().unwrap().len(), 2);
    }
    let (_, listed) = get(&app, "/api/orders?email=bulk@email.com").await;
    assert_eq!(listed.as_array().unwrap().len(), 16);
}

#[tokio::test]
async fn update_status_on_missing_order_is_not_found() {
    let (app, state) = test_app();

    let (status, error) = post(
        &app,
        "/api/orders/update-status",
        json!({"id": "FW-404", "status": "Shipped"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"], "order FW-404 not found");
    assert_eq!(count_rows(&state, "orders").await, 0);
}

#[tokio::test]
async fn update_status_changes_only_status() {
    let (app, _state) = test_app();
    seed_catalog(&app).await;
    post(&app, "/api/orders", order_body("FW-4001", "sarah@email.com")).await;

    let (status, body) = post(
        &app,
        "/api/orders/update-status",
        json!({"id": "FW-4001", "status": "Shipped"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let (_, order) = get(&app, "/api/orders/FW-4001").await;
    assert_eq!(order["status"], "Shipped");
    assert_eq!(order["items"].as_array().unwrap().len(), 2);

    // Any enumerated status is accepted, even backwards
    let (status, _) = post(
        &app,
        "/api/orders/update-status",
        json!({"id": "FW-4001", "status": "Pending"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(
        &app,
        "/api/orders/update-status",
        json!({"id": "FW-4001", "status": "Lost"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn email_filter_lists_newest_first() {
    let (app, _state) = test_app();
    seed_catalog(&app).await;

    post(&app, "/api/orders", order_body("FW-A", "x@email.com")).await;
    post(&app, "/api/orders", order_body("FW-OTHER", "y@email.com")).await;
    post(&app, "/api/orders", order_body("FW-B", "x@email.com")).await;

    let (status, listed) = get(&app, "/api/orders?email=x@email.com").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|order| order["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["FW-B", "FW-A"]);

    let (_, all) = get(&app, "/api/orders").await;
    assert_eq!(all.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn fetched_items_can_be_resubmitted() {
    let (app, _state) = test_app();
    seed_catalog(&app).await;
    post(&app, "/api/orders", order_body("FW-5001", "sarah@email.com")).await;

    let (_, original) = get(&app, "/api/orders/FW-5001").await;
    let mut resubmit = original.clone();
    resubmit["id"] = json!("FW-5002");
    let (status, _) = post(&app, "/api/orders", resubmit).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, copy) = get(&app, "/api/orders/FW-5002").await;
    assert_eq!(copy["items"], original["items"]);
    assert_eq!(copy["total"], original["total"]);
}

#[tokio::test]
async fn missing_order_is_not_found() {
    let (app, _state) = test_app();
    let (status, error) = get(&app, "/api/orders/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"], "order nope not found");
}

#[tokio::test]
async fn orders_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (app, _state) = file_app(dir.path());
        seed_catalog(&app).await;
        let (status, _) = post(&app, "/api/orders", order_body("FW-6001", "sarah@email.com")).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (app, _state) = file_app(dir.path());
    let (status, order) = get(&app, "/api/orders/FW-6001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn storefront_checkout_payload_is_accepted() {
    let (app, _state) = test_app();
    seed_catalog(&app).await;

    let checkout = json!({
        "id": "o-lq2v8k",
        "createdAt": 1718000000000u64,
        "status": "Paid",
        "items": [
            {"id": "claw-hammer", "name": "Claw Hammer", "price": 249.99, "qty": 2, "image": ""},
            {"id": "angle-grinder", "name": "Angle Grinder", "price": 899.5, "qty": 1, "image": ""}
        ],
        "total": 1399.48,
        "customer": {
            "name": "Lisa Anderson",
            "email": "lisa.anderson@email.com",
            "phone": "+27 84 345 6789",
            "address": "7 Smithy Lane, Durban",
            "delivery": "pickup"
        }
    });
    let (status, created) = post(&app, "/api/orders", checkout).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");

    let (_, order) = get(&app, "/api/orders/o-lq2v8k").await;
    assert_eq!(order["customer_name"], "Lisa Anderson");
    assert_eq!(order["customer_email"], "lisa.anderson@email.com");
    assert_eq!(order["customer_address"], "7 Smithy Lane, Durban");
    assert_eq!(order["delivery_option"], "pickup");
    assert_eq!(order["status"], "Paid");
    assert_eq!(order["items"][0]["quantity"], 2);

    let (_, listed) = get(&app, "/api/orders?email=lisa.anderson@email.com").await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}
