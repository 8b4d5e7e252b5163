use chrono::{Duration, Utc};
use rand::Rng;
use rusqlite::params;

use crate::error::AppResult;
use crate::state::DbPool;

/// Create a new session for a user. Returns the session token.
pub fn create_session(pool: &DbPool, user_id: i64, hours: u64) -> AppResult<String> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();
    let now = Utc::now();
    let expires_at = now + Duration::hours(hours as i64);

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, user_id, token, expires_at, now],
    )?;

    Ok(token)
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
    }

    #[test]
    fn create_and_delete_session() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (created_at, name, email, password_hash) \
             VALUES (?1, 'alice', 'alice@example.com', 'x')",
            params![Utc::now()],
        )
        .unwrap();
        let user_id = conn.last_insert_rowid();
        drop(conn);

        let token = create_session(&pool, user_id, 24).unwrap();

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sessions WHERE token = ?1",
                params![token],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
        drop(conn);

        delete_session(&pool, &token).unwrap();
        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
