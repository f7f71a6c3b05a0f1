//! Accounts, password hashing and session token issuance.
//!
//! Passwords are stored as bcrypt hashes (`$2b$<cost>$...`) with the salt
//! embedded. Session tokens are opaque and not tracked server-side.

use tokio::task;
use tracing::instrument;

use crate::error::{AppError, AppResult};
use crate::model::{
    DeleteUserRequest, LoginRequest, LoginResponse, RegisterRequest, Role, UpdateUserRequest, User,
};
use crate::store::Store;
use crate::store::users::{self, NewUser, UserChanges};
use crate::utils::{non_empty, now_timestamp};

const INVALID_CREDENTIALS: &str = "invalid email or password";

pub const DEFAULT_HASH_COST: u32 = 10;
/// Lowest cost accepted from configuration.
pub const MIN_HASH_COST: u32 = 10;
pub const MAX_HASH_COST: u32 = 31;

pub fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    bcrypt::hash(password, cost)
        .map_err(|err| AppError::Storage(format!("password hashing failed: {err}")))
}

/// Checks `password` against a stored hash; malformed hashes never match.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    bcrypt::verify(password, encoded).unwrap_or(false)
}

pub fn issue_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Hashing is CPU bound; keep it off the async workers.
async fn hash_off_thread(password: String, cost: u32) -> AppResult<String> {
    task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|err| AppError::Storage(format!("hashing task failed: {err}")))?
}

async fn verify_off_thread(password: String, encoded: String) -> AppResult<bool> {
    task::spawn_blocking(move || verify_password(&password, &encoded))
        .await
        .map_err(|err| AppError::Storage(format!("hashing task failed: {err}")))
}

#[derive(Debug, Clone)]
pub struct AuthService {
    store: Store,
    hash_cost: u32,
}

impl AuthService {
    pub fn new(store: Store, hash_cost: u32) -> Self {
        Self {
            store,
            hash_cost,
        }
    }

    #[instrument(skip(self, request), fields(email = ?request.email))]
    pub async fn register(&self, request: RegisterRequest) -> AppResult<User> {
        let (Some(name), Some(email), Some(password)) = (
            non_empty(request.name),
            non_empty(request.email),
            request.password.filter(|p| !p.is_empty()),
        ) else {
            return Err(AppError::validation("missing required fields"));
        };
        let role = match non_empty(request.role) {
            Some(text) => text
                .parse::<Role>()
                .map_err(|err| AppError::validation(err.to_string()))?,
            None => Role::default(),
        };

        let password_hash = hash_off_thread(password, self.hash_cost).await?;
        let new_user = NewUser {
            name,
            email,
            phone: non_empty(request.phone),
            password_hash,
            role,
        };
        let created_at = now_timestamp();
        let user = self
            .store
            .call("insert_user", move |conn| {
                users::insert_user(conn, &new_user, &created_at)
            })
            .await?;

        tracing::info!(user.id = user.id, role = %user.role, "user registered");
        Ok(user)
    }

    #[instrument(skip(self, request), fields(email = ?request.email))]
    pub async fn login(&self, request: LoginRequest) -> AppResult<LoginResponse> {
        let (Some(email), Some(password)) = (non_empty(request.email), request.password) else {
            return Err(AppError::validation("missing required fields"));
        };

        let found = self
            .store
            .call("find_credentials", move |conn| {
                users::find_credentials(conn, &email)
            })
            .await?;
        let Some((user, encoded)) = found else {
            crate::log_security_event!("login_failed", reason = "unknown_email");
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        };
        if !verify_off_thread(password, encoded).await? {
            crate::log_security_event!("login_failed", user.id = user.id, reason = "bad_password");
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        }

        tracing::info!(user.id = user.id, "user logged in");
        Ok(LoginResponse {
            user,
            token: issue_token(),
        })
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        Ok(self
            .store
            .call("list_users", |conn| users::list_users(conn))
            .await?)
    }

    pub async fn get_user(&self, id: i64) -> AppResult<User> {
        self.store
            .call("get_user", move |conn| users::get_user(conn, id))
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {id} not found")))
    }

    #[instrument(skip(self, request), fields(user.id = ?request.id))]
    pub async fn update_user(&self, request: UpdateUserRequest) -> AppResult<User> {
        let (Some(id), Some(name), Some(email)) = (
            request.id,
            non_empty(request.name),
            non_empty(request.email),
        ) else {
            return Err(AppError::validation("missing required fields"));
        };
        let password_hash = match request.password.filter(|p| !p.is_empty()) {
            Some(password) => Some(hash_off_thread(password, self.hash_cost).await?),
            None => None,
        };
        let changes = UserChanges {
            name,
            email,
            phone: non_empty(request.phone),
            password_hash,
        };

        self.store
            .call("update_user", move |conn| users::update_user(conn, id, &changes))
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {id} not found")))
    }

    pub async fn delete_user(&self, request: DeleteUserRequest) -> AppResult<()> {
        let Some(id) = request.id else {
            return Err(AppError::validation("missing required fields"));
        };
        let deleted = self
            .store
            .call("delete_user", move |conn| users::delete_user(conn, id))
            .await?;
        if !deleted {
            return Err(AppError::not_found(format!("user {id} not found")));
        }
        tracing::info!(user.id = id, "user deleted");
        Ok(())
    }
}
