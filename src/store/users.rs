use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{StoreError, conflict_or_db};
use crate::model::{Role, User};

/// Fields needed to insert a user; `password_hash` is already encoded.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

/// Replacement values for an existing user
#[derive(Debug, Clone)]
pub struct UserChanges {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
}

const USER_COLUMNS: &str = "id, name, email, phone, role, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    let role = role.parse::<Role>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(err))
    })?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        role,
        created_at: row.get(5)?,
    })
}

fn email_taken(email: &str) -> impl FnOnce() -> String + '_ {
    move || format!("email {email} is already registered")
}

pub fn insert_user(conn: &Connection, user: &NewUser, created_at: &str) -> Result<User, StoreError> {
    conn.execute(
        "INSERT INTO users (name, email, phone, password, role, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.name,
            user.email,
            user.phone,
            user.password_hash,
            user.role.as_str(),
            created_at,
        ],
    )
    .map_err(|err| conflict_or_db(err, email_taken(&user.email)))?;

    Ok(User {
        id: conn.last_insert_rowid(),
        name: user.name.clone(),
        email: user.email.clone(),
        phone: user.phone.clone(),
        role: user.role,
        created_at: created_at.to_string(),
    })
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>, StoreError> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn get_user(conn: &Connection, id: i64) -> Result<Option<User>, StoreError> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
    Ok(stmt.query_row(params![id], user_from_row).optional()?)
}

/// User plus stored password hash, for login.
pub fn find_credentials(
    conn: &Connection,
    email: &str,
) -> Result<Option<(User, String)>, StoreError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {USER_COLUMNS}, password FROM users WHERE email = ?1"
    ))?;
    let found = stmt
        .query_row(params![email], |row| Ok((user_from_row(row)?, row.get(6)?)))
        .optional()?;
    Ok(found)
}

/// Returns the updated user, or `None` when `id` does not exist.
pub fn update_user(
    conn: &mut Connection,
    id: i64,
    changes: &UserChanges,
) -> Result<Option<User>, StoreError> {
    let tx = conn.transaction()?;
    let changed = match &changes.password_hash {
        Some(hash) => tx.execute(
            "UPDATE users SET name = ?1, email = ?2, phone = ?3, password = ?4 WHERE id = ?5",
            params![changes.name, changes.email, changes.phone, hash, id],
        ),
        None => tx.execute(
            "UPDATE users SET name = ?1, email = ?2, phone = ?3 WHERE id = ?4",
            params![changes.name, changes.email, changes.phone, id],
        ),
    }
    .map_err(|err| conflict_or_db(err, email_taken(&changes.email)))?;

    if changed == 0 {
        return Ok(None);
    }
    let user = get_user(&tx, id)?;
    tx.commit()?;
    Ok(user)
}

pub fn delete_user(conn: &Connection, id: i64) -> Result<bool, StoreError> {
    let changed = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use assert_matches::assert_matches;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Sarah Johnson".into(),
            email: email.into(),
            phone: Some("+27 83 234 5678".into()),
            password_hash: "$2b$04$placeholderplaceholderpl".into(),
            role: Role::Customer,
        }
    }

    #[tokio::test]
    async fn credentials_lookup_returns_hash() {
        let store = Store::open_in_memory().unwrap();
        let (user, found) = store
            .call("test", |conn| {
                let user = insert_user(conn, &new_user("sarahj@email.com"), "2024-01-01T00:00:00.000Z")?;
                let found = find_credentials(conn, "sarahj@email.com")?;
                Ok((user, found))
            })
            .await
            .unwrap();

        let (stored, hash) = found.expect("user found");
        assert_eq!(stored, user);
        assert_eq!(hash, "$2b$04$placeholderplaceholderpl");
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict() {
        let store = Store::open_in_memory().unwrap();
        let result = store
            .call("test", |conn| {
                insert_user(conn, &new_user("dup@email.com"), "2024-01-01T00:00:00.000Z")?;
                insert_user(conn, &new_user("dup@email.com"), "2024-01-01T00:00:00.000Z")
            })
            .await;
        assert_matches!(result, Err(StoreError::Conflict(msg)) if msg.contains("dup@email.com"));
    }

    #[tokio::test]
    async fn update_and_delete_missing_user() {
        let store = Store::open_in_memory().unwrap();
        let (updated, deleted) = store
            .call("test", |conn| {
                let changes = UserChanges {
                    name: "Ghost".into(),
                    email: "ghost@email.com".into(),
                    phone: None,
                    password_hash: None,
                };
                Ok((update_user(conn, 99, &changes)?, delete_user(conn, 99)?))
            })
            .await
            .unwrap();
        assert_eq!(updated, None);
        assert!(!deleted);
    }
}
