//! HTTP routes for the storefront API.
//!
//! Handlers are thin: they unwrap extractor rejections into [`AppError`],
//! delegate to a service on [`AppState`] and wrap the result in JSON.

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::health::{self, HealthChecker};
use crate::metrics::{self, track_requests};
use crate::model::{
    CreateOrderRequest, DeleteUserRequest, LoginRequest, LoginResponse, OrderFilter, OrderView,
    Product, ProductRequest, RegisterRequest, StatusUpdateRequest, SuccessResponse,
    UpdateUserRequest, User,
};
use crate::state::AppState;

type Shared = State<Arc<AppState>>;

/// Builds the full application router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let checker = Arc::new(HealthChecker::new(state.clone()));

    let api = Router::new()
        .route("/api/products", get(list_products).post(create_product))
        .route("/api/products/{id}", get(get_product))
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/update-status", post(update_order_status))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/users", get(list_users))
        .route("/api/users/update", post(update_user))
        .route("/api/users/delete", post(delete_user))
        .route("/api/users/{id}", get(get_user))
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .with_state(state);

    let ops = Router::new()
        .route("/health", get(health::liveness_handler))
        .route("/ready", get(health::readiness_handler))
        .with_state(checker);

    api.merge(ops)
        .route("/metrics", get(metrics::metrics_handler))
        .fallback(route_not_found)
        .layer(middleware::from_fn(track_requests))
}

async fn route_not_found() -> AppError {
    AppError::not_found("route not found")
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

async fn list_products(State(state): Shared) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(state.catalog.list_products().await?))
}

async fn get_product(
    State(state): Shared,
    id: Result<Path<String>, PathRejection>,
) -> AppResult<Json<Product>> {
    let Path(id) = id?;
    Ok(Json(state.catalog.get_product(id).await?))
}

async fn create_product(
    State(state): Shared,
    body: Result<Json<ProductRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Product>)> {
    let Json(request) = body?;
    let product = state.catalog.create_product(request).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

async fn list_orders(
    State(state): Shared,
    filter: Result<Query<OrderFilter>, QueryRejection>,
) -> AppResult<Json<Vec<OrderView>>> {
    let Query(filter) = filter?;
    Ok(Json(state.orders.list_orders(filter).await?))
}

async fn get_order(
    State(state): Shared,
    id: Result<Path<String>, PathRejection>,
) -> AppResult<Json<OrderView>> {
    let Path(id) = id?;
    Ok(Json(state.orders.get_order(id).await?))
}

async fn create_order(
    State(state): Shared,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<OrderView>)> {
    let Json(request) = body?;
    let order = state.orders.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn update_order_status(
    State(state): Shared,
    body: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> AppResult<Json<SuccessResponse>> {
    let Json(request) = body?;
    state.orders.update_status(request).await?;
    Ok(Json(SuccessResponse::ok()))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

async fn list_users(State(state): Shared) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.auth.list_users().await?))
}

async fn get_user(
    State(state): Shared,
    id: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<User>> {
    let Path(id) = id?;
    Ok(Json(state.auth.get_user(id).await?))
}

async fn update_user(
    State(state): Shared,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> AppResult<Json<User>> {
    let Json(request) = body?;
    Ok(Json(state.auth.update_user(request).await?))
}

async fn delete_user(
    State(state): Shared,
    body: Result<Json<DeleteUserRequest>, JsonRejection>,
) -> AppResult<Json<SuccessResponse>> {
    let Json(request) = body?;
    state.auth.delete_user(request).await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn register(
    State(state): Shared,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<User>)> {
    let Json(request) = body?;
    let user = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): Shared,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let Json(request) = body?;
    Ok(Json(state.auth.login(request).await?))
}
