//! Catalog operations over the products table.

use std::collections::BTreeSet;
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::model::{Product, ProductRequest};
use crate::store::{Store, catalog};
use crate::utils::{non_empty, now_timestamp};

#[derive(Debug, Clone)]
pub struct CatalogService {
    store: Store,
}

impl CatalogService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn list_products(&self) -> AppResult<Vec<Product>> {
        Ok(self
            .store
            .call("list_products", |conn| catalog::list_products(conn))
            .await?)
    }

    pub async fn get_product(&self, id: String) -> AppResult<Product> {
        let lookup = id.clone();
        self.store
            .call("get_product", move |conn| catalog::get_product(conn, &lookup))
            .await?
            .ok_or_else(|| AppError::not_found(format!("product {id} not found")))
    }

    #[instrument(skip(self, request), fields(product.id = ?request.id))]
    pub async fn create_product(&self, request: ProductRequest) -> AppResult<Product> {
        let product = validate_product(request)?;
        let created_at = now_timestamp();
        let to_insert = product.clone();
        self.store
            .call("create_product", move |conn| {
                catalog::insert_product(conn, &to_insert, &created_at)
            })
            .await?;
        tracing::info!(product.id = %product.id, "product created");
        Ok(product)
    }

    /// Subset of `ids` that exist in the catalog.
    pub async fn products_exist(&self, ids: BTreeSet<String>) -> AppResult<BTreeSet<String>> {
        Ok(self
            .store
            .call("products_exist", move |conn| {
                catalog::existing_product_ids(conn, &ids)
            })
            .await?)
    }
}

fn validate_product(request: ProductRequest) -> AppResult<Product> {
    let (Some(id), Some(name)) = (non_empty(request.id), non_empty(request.name)) else {
        return Err(AppError::validation("missing required fields"));
    };
    let price = request
        .price
        .as_ref()
        .and_then(|value| value.as_f64())
        .filter(|price| price.is_finite() && *price >= 0.0)
        .ok_or_else(|| AppError::validation("price must be a non-negative number"))?;

    Ok(Product {
        id,
        name,
        price,
        category: non_empty(request.category),
        image: non_empty(request.image),
        info: non_empty(request.info),
        description: non_empty(request.description),
    })
}
