use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

const USER_COLUMNS: &str =
    "id, created_at, name, email, password_hash, is_admin, is_active, recovery_code";

const RECOVERY_CODE_LENGTH: usize = 30;
const RECOVERY_CODE_CHARACTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

// A valid bcrypt hash that no password verifies against; see authenticate().
const DUMMY_HASH: &str = "$2b$12$EXRkfkdmXn2gzds2SSitu.MW9.gAVqa9eLS1//RYtYCmB1eLHg.9q";

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Hashes the password and creates an active user. The vote set starts
    /// empty by construction (no rows in the votes table).
    async fn insert(&self, new: NewUser) -> AppResult<User>;

    async fn update(&self, user: &User) -> AppResult<()>;

    async fn set_password(&self, user_id: i64, password: &str) -> AppResult<()>;

    /// Existence check, excluding the user's own row when editing.
    async fn is_name_available(&self, name: &str, exclude_id: Option<i64>) -> AppResult<bool>;

    async fn is_email_available(&self, email: &str, exclude_id: Option<i64>) -> AppResult<bool>;

    async fn get_active(&self, user_id: i64) -> AppResult<Option<User>>;

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn get_by_recovery_code(&self, code: &str) -> AppResult<Option<User>>;

    /// Generate, store and return a single-use recovery code.
    async fn set_recovery_code(&self, user_id: i64) -> AppResult<String>;

    async fn clear_recovery_code(&self, user_id: i64) -> AppResult<()>;

    /// Vote-set membership: has this user already voted on this photo?
    async fn has_voted(&self, user_id: i64, photo_id: i64) -> AppResult<bool>;

    /// Identifier may be a name or an email. All failure modes (unknown
    /// identifier, inactive account, wrong password) return None so the
    /// caller cannot tell them apart.
    async fn authenticate(&self, identifier: &str, password: &str) -> AppResult<Option<User>>;
}

pub struct SqliteUserRepository {
    pool: DbPool,
}

impl SqliteUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        created_at: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        password_hash: row.get(4)?,
        is_admin: row.get(5)?,
        is_active: row.get(6)?,
        recovery_code: row.get(7)?,
    })
}

fn generate_recovery_code() -> String {
    let mut rng = rand::thread_rng();
    (0..RECOVERY_CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..RECOVERY_CODE_CHARACTERS.len());
            RECOVERY_CODE_CHARACTERS[idx] as char
        })
        .collect()
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn insert(&self, new: NewUser) -> AppResult<User> {
        let password_hash = bcrypt::hash(&new.password, bcrypt::DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Hashing password: {}", e)))?;
        let created_at = Utc::now();

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO users (created_at, name, email, password_hash, is_admin, is_active) \
             VALUES (?1, ?2, ?3, ?4, 0, 1)",
            params![created_at, new.name, new.email, password_hash],
        )
        .map_err(|e| AppError::from_constraint(e, "Name or email already taken"))?;

        Ok(User {
            id: conn.last_insert_rowid(),
            created_at,
            name: new.name,
            email: new.email,
            password_hash,
            is_admin: false,
            is_active: true,
            recovery_code: None,
        })
    }

    async fn update(&self, user: &User) -> AppResult<()> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "UPDATE users SET name = ?1, email = ?2, is_admin = ?3, is_active = ?4 \
                 WHERE id = ?5",
                params![user.name, user.email, user.is_admin, user.is_active, user.id],
            )
            .map_err(|e| AppError::from_constraint(e, "Name or email already taken"))?;
        if rows == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn set_password(&self, user_id: i64, password: &str) -> AppResult<()> {
        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Hashing password: {}", e)))?;
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, user_id],
        )?;
        if rows == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn is_name_available(&self, name: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        let conn = self.pool.get()?;
        let count: i64 = match exclude_id {
            Some(id) => conn.query_row(
                "SELECT COUNT(id) FROM users WHERE name = ?1 AND id != ?2",
                params![name, id],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(id) FROM users WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )?,
        };
        Ok(count == 0)
    }

    async fn is_email_available(&self, email: &str, exclude_id: Option<i64>) -> AppResult<bool> {
        let conn = self.pool.get()?;
        let count: i64 = match exclude_id {
            Some(id) => conn.query_row(
                "SELECT COUNT(id) FROM users WHERE email = ?1 AND id != ?2",
                params![email, id],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(id) FROM users WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )?,
        };
        Ok(count == 0)
    }

    async fn get_active(&self, user_id: i64) -> AppResult<Option<User>> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE is_active = 1 AND id = ?1", USER_COLUMNS),
                params![user_id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE is_active = 1 AND email = ?1",
                    USER_COLUMNS
                ),
                params![email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn get_by_recovery_code(&self, code: &str) -> AppResult<Option<User>> {
        if code.is_empty() {
            return Ok(None);
        }
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE is_active = 1 AND recovery_code = ?1",
                    USER_COLUMNS
                ),
                params![code],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn set_recovery_code(&self, user_id: i64) -> AppResult<String> {
        let code = generate_recovery_code();
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users SET recovery_code = ?1 WHERE id = ?2",
            params![code, user_id],
        )?;
        if rows == 0 {
            return Err(AppError::NotFound);
        }
        Ok(code)
    }

    async fn clear_recovery_code(&self, user_id: i64) -> AppResult<()> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users SET recovery_code = NULL WHERE id = ?1",
            params![user_id],
        )?;
        if rows == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn has_voted(&self, user_id: i64, photo_id: i64) -> AppResult<bool> {
        let conn = self.pool.get()?;
        let voted: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM votes WHERE user_id = ?1 AND photo_id = ?2)",
            params![user_id, photo_id],
            |row| row.get(0),
        )?;
        Ok(voted)
    }

    async fn authenticate(&self, identifier: &str, password: &str) -> AppResult<Option<User>> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE is_active = 1 AND (email = ?1 OR name = ?1)",
                    USER_COLUMNS
                ),
                params![identifier],
                user_from_row,
            )
            .optional()?;

        match user {
            Some(user) => {
                let ok = bcrypt::verify(password, &user.password_hash).unwrap_or(false);
                Ok(ok.then_some(user))
            }
            None => {
                // Burn a verification on the miss path too, so an unknown
                // identifier costs the same as a wrong password.
                let _ = bcrypt::verify(password, DUMMY_HASH);
                Ok(None)
            }
        }
    }
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynUserRepository = Arc<dyn UserRepository>;
