use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{StoreError, conflict_or_db, lenient_f64, lenient_i64};
use crate::model::{NewOrder, OrderStatus};

/// Header row as stored; enum columns are still raw text.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
    pub delivery_option: Option<String>,
    pub status: String,
    pub total: f64,
    pub created_at: String,
}

/// Item row joined with the product name, tagged with its owning order.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub order_id: String,
    pub product_id: String,
    pub product_name: Option<String>,
    pub quantity: i64,
    pub price: f64,
}

const HEADER_COLUMNS: &str = "id, customer_name, customer_email, customer_phone, customer_address, \
     delivery_option, status, total, created_at";

const ITEM_SELECT: &str = "SELECT oi.order_id, oi.product_id, p.name, oi.quantity, oi.price
     FROM order_items oi
     LEFT JOIN products p ON p.id = oi.product_id";

fn header_from_row(row: &Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok(OrderRow {
        id: row.get(0)?,
        customer_name: row.get(1)?,
        customer_email: row.get(2)?,
        customer_phone: row.get(3)?,
        customer_address: row.get(4)?,
        delivery_option: row.get(5)?,
        status: row.get(6)?,
        total: lenient_f64(row.get_ref(7)?, "orders.total"),
        created_at: row.get(8)?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        order_id: row.get(0)?,
        product_id: row.get(1)?,
        product_name: row.get(2)?,
        quantity: lenient_i64(row.get_ref(3)?, "order_items.quantity"),
        price: lenient_f64(row.get_ref(4)?, "order_items.price"),
    })
}

/// Writes the header and every item in one transaction.
///
/// Returning early drops the transaction, which rolls back anything already
/// written, so a failed call leaves no rows behind.
pub fn insert_order(
    conn: &mut Connection,
    order: &NewOrder,
    created_at: &str,
) -> Result<(), StoreError> {
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO orders (id, customer_name, customer_email, customer_phone, customer_address,
                             delivery_option, status, total, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            order.id,
            order.customer_name,
            order.customer_email,
            order.customer_phone,
            order.customer_address,
            order.delivery_option.as_str(),
            order.status.as_str(),
            order.total,
            created_at,
        ],
    )
    .map_err(|err| conflict_or_db(err, || format!("order {} already exists", order.id)))?;

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO order_items (order_id, product_id, quantity, price) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for item in &order.items {
            stmt.execute(params![order.id, item.product_id, item.quantity, item.price])?;
        }
    }

    tx.commit()?;
    Ok(())
}

/// Header plus items for one order, read in a single transaction.
pub fn fetch_order(
    conn: &mut Connection,
    id: &str,
) -> Result<Option<(OrderRow, Vec<ItemRow>)>, StoreError> {
    let tx = conn.transaction()?;

    let header = tx
        .prepare_cached(&format!("SELECT {HEADER_COLUMNS} FROM orders WHERE id = ?1"))?
        .query_row(params![id], header_from_row)
        .optional()?;
    let Some(header) = header else {
        return Ok(None);
    };

    let items = tx
        .prepare_cached(&format!("{ITEM_SELECT} WHERE oi.order_id = ?1 ORDER BY oi.id"))?
        .query_map(params![id], item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    tx.commit()?;
    Ok(Some((header, items)))
}

/// Headers newest first, with every item belonging to them.
///
/// Both queries run inside one transaction so the item set always matches
/// the header set. Items come back in insertion order and are grouped by the
/// caller.
pub fn list_orders(
    conn: &mut Connection,
    email: Option<&str>,
) -> Result<(Vec<OrderRow>, Vec<ItemRow>), StoreError> {
    let tx = conn.transaction()?;

    let (headers, items) = match email {
        Some(email) => {
            let headers = tx
                .prepare_cached(&format!(
                    "SELECT {HEADER_COLUMNS} FROM orders WHERE customer_email = ?1
                     ORDER BY created_at DESC, rowid DESC"
                ))?
                .query_map(params![email], header_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            let items = tx
                .prepare_cached(&format!(
                    "{ITEM_SELECT} WHERE oi.order_id IN
                        (SELECT id FROM orders WHERE customer_email = ?1)
                     ORDER BY oi.id"
                ))?
                .query_map(params![email], item_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            (headers, items)
        }
        None => {
            let headers = tx
                .prepare_cached(&format!(
                    "SELECT {HEADER_COLUMNS} FROM orders ORDER BY created_at DESC, rowid DESC"
                ))?
                .query_map([], header_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            let items = tx
                .prepare_cached(&format!("{ITEM_SELECT} ORDER BY oi.id"))?
                .query_map([], item_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            (headers, items)
        }
    };

    tx.commit()?;
    Ok((headers, items))
}

/// Returns the number of rows changed (0 when the order does not exist).
pub fn update_status(
    conn: &Connection,
    id: &str,
    status: OrderStatus,
) -> Result<usize, StoreError> {
    let changed = conn.execute(
        "UPDATE orders SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;
    Ok(changed)
}

pub fn count_orders(conn: &Connection) -> Result<i64, StoreError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?)
}
