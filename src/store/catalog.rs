use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::collections::BTreeSet;

use super::{StoreError, conflict_or_db, lenient_f64};
use crate::model::Product;

const PRODUCT_COLUMNS: &str = "id, name, price, category, image, info, description";

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        price: lenient_f64(row.get_ref(2)?, "products.price"),
        category: row.get(3)?,
        image: row.get(4)?,
        info: row.get(5)?,
        description: row.get(6)?,
    })
}

/// All products in insertion order.
pub fn list_products(conn: &Connection) -> Result<Vec<Product>, StoreError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY rowid"
    ))?;
    let products = stmt
        .query_map([], product_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(products)
}

pub fn get_product(conn: &Connection, id: &str) -> Result<Option<Product>, StoreError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
    ))?;
    Ok(stmt.query_row(params![id], product_from_row).optional()?)
}

pub fn insert_product(
    conn: &Connection,
    product: &Product,
    created_at: &str,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO products (id, name, price, category, image, info, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            product.id,
            product.name,
            product.price,
            product.category,
            product.image,
            product.info,
            product.description,
            created_at,
        ],
    )
    .map_err(|err| conflict_or_db(err, || format!("product {} already exists", product.id)))?;
    Ok(())
}

/// Returns the subset of `ids` present in the catalog, in one query.
pub fn existing_product_ids(
    conn: &Connection,
    ids: &BTreeSet<String>,
) -> Result<BTreeSet<String>, StoreError> {
    if ids.is_empty() {
        return Ok(BTreeSet::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM products WHERE id IN ({placeholders})"
    ))?;
    let found = stmt
        .query_map(params_from_iter(ids.iter()), |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(found)
}
