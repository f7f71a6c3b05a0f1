use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raised when a stored or submitted enum value is not a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {field} value {value:?}")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        field: $field,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum! {
    /// How an order reaches the customer
    DeliveryOption, "delivery_option" {
        #[default]
        Standard => "standard",
        Express => "express",
        Pickup => "pickup",
    }
}

string_enum! {
    /// Order lifecycle state. Any state may be set from any other.
    OrderStatus, "status" {
        #[default]
        Pending => "Pending",
        Processing => "Processing",
        Shipped => "Shipped",
        Delivered => "Delivered",
        Cancelled => "Cancelled",
        Paid => "Paid",
    }
}

string_enum! {
    Role, "role" {
        Admin => "admin",
        Supplier => "supplier",
        #[default]
        Customer => "customer",
    }
}

// =============================================================================
// CATALOG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub category: Option<String>,
    pub image: Option<String>,
    pub info: Option<String>,
    pub description: Option<String>,
}

/// Body of `POST /api/products` before validation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductRequest {
    pub id: Option<String>,
    pub name: Option<String>,
    pub price: Option<Value>,
    pub category: Option<String>,
    pub image: Option<String>,
    pub info: Option<String>,
    pub description: Option<String>,
}

// =============================================================================
// ORDERS
// =============================================================================

/// Body of `POST /api/orders` before validation.
///
/// Every field is optional so that missing or mistyped input surfaces as a
/// validation error naming the field instead of a generic decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub id: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
    pub delivery_option: Option<String>,
    pub status: Option<String>,
    pub total: Option<Value>,
    pub items: Option<Vec<OrderItemRequest>>,
    /// Storefront checkout spelling of `delivery_option`
    pub delivery: Option<String>,
    /// Storefront checkout form; flat `customer_*` fields take precedence
    pub customer: Option<CustomerRequest>,
}

/// Nested customer block sent by the storefront checkout page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub delivery: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderItemRequest {
    #[serde(alias = "id")]
    pub product_id: Option<Value>,
    #[serde(alias = "qty")]
    pub quantity: Option<Value>,
    pub price: Option<Value>,
}

/// A validated order ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
    pub delivery_option: DeliveryOption,
    pub status: OrderStatus,
    pub total: f64,
    pub items: Vec<OrderLine>,
}

/// One validated line of a [`NewOrder`]
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: i64,
    pub price: f64,
}

/// Nested order returned by every order endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    pub id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
    pub delivery_option: DeliveryOption,
    pub status: OrderStatus,
    pub total: f64,
    pub created_at: String,
    pub items: Vec<OrderItemView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemView {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub quantity: i64,
    pub price: f64,
}

impl From<&OrderLine> for OrderItemView {
    fn from(line: &OrderLine) -> Self {
        Self {
            product_id: line.product_id.clone(),
            name: None,
            quantity: line.quantity,
            price: line.price,
        }
    }
}

/// Query string of `GET /api/orders`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusUpdateRequest {
    pub id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

// =============================================================================
// USERS
// =============================================================================

/// Public view of a user; the password hash never leaves the store layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteUserRequest {
    pub id: Option<i64>,
}
