//! Order placement and reconstruction.
//!
//! Placement validates the submitted cart in three passes (shape, line
//! items, catalog references) before anything is written, then stores the
//! header and its lines in one transaction. Reads fetch headers and lines as
//! structured rows and regroup the lines under their owning header.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::instrument;

use crate::catalog::CatalogService;
use crate::error::{AppError, AppResult};
use crate::metrics::METRICS;
use crate::model::{
    CreateOrderRequest, DeliveryOption, NewOrder, OrderFilter, OrderItemRequest, OrderItemView,
    OrderLine, OrderStatus, OrderView, StatusUpdateRequest,
};
use crate::store::orders::{self as order_rows, ItemRow, OrderRow};
use crate::store::{Store, StoreError};
use crate::utils::{non_empty, now_timestamp};

/// Name reported for a line whose product no longer resolves.
pub const UNKNOWN_PRODUCT_NAME: &str = "Unknown product";

const MISSING_REQUIRED_FIELDS: &str = "missing required fields";

#[derive(Debug, Clone)]
pub struct OrderService {
    store: Store,
    catalog: CatalogService,
}

impl OrderService {
    pub fn new(store: Store, catalog: CatalogService) -> Self {
        Self { store, catalog }
    }

    /// Validates and persists a new order.
    ///
    /// The returned view echoes the submitted lines (without product names)
    /// and carries the server-assigned `created_at`.
    #[instrument(skip(self, request), fields(order.id = ?request.id))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> AppResult<OrderView> {
        let order = validate_order(request)?;

        let wanted: BTreeSet<String> = order
            .items
            .iter()
            .map(|line| line.product_id.clone())
            .collect();
        let found = self.catalog.products_exist(wanted.clone()).await?;
        let missing: Vec<&str> = wanted.difference(&found).map(String::as_str).collect();
        if !missing.is_empty() {
            return Err(AppError::validation(format!(
                "invalid product ids: {}",
                missing.join(", ")
            )));
        }

        let created_at = now_timestamp();
        let (order, created_at) = self
            .store
            .call("insert_order", move |conn| {
                order_rows::insert_order(conn, &order, &created_at)?;
                Ok((order, created_at))
            })
            .await?;

        METRICS.record_order_created();
        tracing::info!(
            order.id = %order.id,
            items = order.items.len(),
            total = order.total,
            "order placed"
        );

        Ok(OrderView {
            items: order.items.iter().map(OrderItemView::from).collect(),
            id: order.id,
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            customer_phone: order.customer_phone,
            customer_address: order.customer_address,
            delivery_option: order.delivery_option,
            status: order.status,
            total: order.total,
            created_at,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, id: String) -> AppResult<OrderView> {
        let lookup = id.clone();
        let fetched = self
            .store
            .call("fetch_order", move |conn| order_rows::fetch_order(conn, &lookup))
            .await?;
        let (header, items) =
            fetched.ok_or_else(|| AppError::not_found(format!("order {id} not found")))?;

        assemble(header, items.into_iter().map(item_view).collect())
    }

    /// All orders newest first, optionally for one customer email.
    #[instrument(skip(self, filter), fields(email = ?filter.email))]
    pub async fn list_orders(&self, filter: OrderFilter) -> AppResult<Vec<OrderView>> {
        let email = non_empty(filter.email);
        let (headers, items) = self
            .store
            .call("list_orders", move |conn| {
                order_rows::list_orders(conn, email.as_deref())
            })
            .await?;

        let mut grouped: HashMap<String, Vec<OrderItemView>> = HashMap::new();
        for item in items {
            grouped
                .entry(item.order_id.clone())
                .or_default()
                .push(item_view(item));
        }

        headers
            .into_iter()
            .map(|header| {
                let lines = grouped.remove(&header.id).unwrap_or_default();
                assemble(header, lines)
            })
            .collect()
    }

    /// Sets the status of an existing order. Transitions are unrestricted.
    #[instrument(skip(self, request), fields(order.id = ?request.id, status = ?request.status))]
    pub async fn update_status(&self, request: StatusUpdateRequest) -> AppResult<()> {
        let (Some(id), Some(status)) = (non_empty(request.id), non_empty(request.status)) else {
            return Err(AppError::validation(MISSING_REQUIRED_FIELDS));
        };
        let status = status
            .parse::<OrderStatus>()
            .map_err(|err| AppError::validation(err.to_string()))?;

        let lookup = id.clone();
        let changed = self
            .store
            .call("update_status", move |conn| {
                order_rows::update_status(conn, &lookup, status)
            })
            .await?;
        if changed == 0 {
            return Err(AppError::not_found(format!("order {id} not found")));
        }

        tracing::info!(order.id = %id, status = %status, "order status updated");
        Ok(())
    }
}

/// Turns a raw request into a [`NewOrder`], failing on the first problem.
///
/// Catalog references are not checked here; that needs the store.
pub fn validate_order(request: CreateOrderRequest) -> AppResult<NewOrder> {
    let CreateOrderRequest {
        id,
        customer_name,
        customer_email,
        customer_phone,
        customer_address,
        delivery_option,
        status,
        total,
        items,
        delivery,
        customer,
    } = request;
    let customer = customer.unwrap_or_default();

    let id = non_empty(id);
    let customer_name = non_empty(customer_name).or_else(|| non_empty(customer.name));
    let customer_email = non_empty(customer_email).or_else(|| non_empty(customer.email));
    let customer_phone = non_empty(customer_phone).or_else(|| non_empty(customer.phone));
    let customer_address = non_empty(customer_address).or_else(|| non_empty(customer.address));
    let delivery_option = non_empty(delivery_option)
        .or_else(|| non_empty(delivery))
        .or_else(|| non_empty(customer.delivery));
    let total = total.as_ref().and_then(Value::as_f64);
    let items = items.filter(|items| !items.is_empty());

    let (Some(id), Some(customer_name), Some(customer_email), Some(total), Some(items)) =
        (id, customer_name, customer_email, total, items)
    else {
        return Err(AppError::validation(MISSING_REQUIRED_FIELDS));
    };
    if !total.is_finite() || total < 0.0 {
        return Err(AppError::validation("total must be a non-negative number"));
    }

    let items = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| validate_line(index, item))
        .collect::<AppResult<Vec<_>>>()?;

    // The checkout form sends display casing ("Express")
    let delivery_option = match delivery_option {
        Some(text) => text
            .to_ascii_lowercase()
            .parse::<DeliveryOption>()
            .map_err(|err| AppError::validation(err.to_string()))?,
        None => DeliveryOption::default(),
    };
    let status = match non_empty(status) {
        Some(text) => text
            .parse::<OrderStatus>()
            .map_err(|err| AppError::validation(err.to_string()))?,
        None => OrderStatus::default(),
    };

    Ok(NewOrder {
        id,
        customer_name,
        customer_email,
        customer_phone,
        customer_address,
        delivery_option,
        status,
        total,
        items,
    })
}

fn validate_line(index: usize, item: OrderItemRequest) -> AppResult<OrderLine> {
    let product_id = item
        .product_id
        .as_ref()
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            AppError::validation(format!("items[{index}].product_id must be a non-empty string"))
        })?;
    let quantity = item
        .quantity
        .as_ref()
        .and_then(Value::as_i64)
        .filter(|quantity| *quantity > 0)
        .ok_or_else(|| {
            AppError::validation(format!("items[{index}].quantity must be a positive integer"))
        })?;
    let price = item
        .price
        .as_ref()
        .and_then(Value::as_f64)
        .filter(|price| price.is_finite() && *price > 0.0)
        .ok_or_else(|| {
            AppError::validation(format!("items[{index}].price must be a positive number"))
        })?;

    Ok(OrderLine {
        product_id: product_id.to_string(),
        quantity,
        price,
    })
}

fn item_view(row: ItemRow) -> OrderItemView {
    OrderItemView {
        product_id: row.product_id,
        name: Some(
            row.product_name
                .unwrap_or_else(|| UNKNOWN_PRODUCT_NAME.to_string()),
        ),
        quantity: row.quantity,
        price: row.price,
    }
}

fn assemble(header: OrderRow, items: Vec<OrderItemView>) -> AppResult<OrderView> {
    let status = header
        .status
        .parse::<OrderStatus>()
        .map_err(|err| StoreError::Corrupt(format!("order {}: {err}", header.id)))?;
    let delivery_option = match non_empty(header.delivery_option) {
        Some(text) => text
            .parse::<DeliveryOption>()
            .map_err(|err| StoreError::Corrupt(format!("order {}: {err}", header.id)))?,
        None => DeliveryOption::default(),
    };

    Ok(OrderView {
        id: header.id,
        customer_name: header.customer_name,
        customer_email: header.customer_email,
        customer_phone: header.customer_phone,
        customer_address: header.customer_address,
        delivery_option,
        status,
        total: header.total,
        created_at: header.created_at,
        items,
    })
}
