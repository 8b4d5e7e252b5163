use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use chrono::Utc;
use rusqlite::params;

use crate::db::models::User;
use crate::error::AppError;
use crate::state::AppState;
use crate::users::repository::user_from_row;

/// The currently authenticated user; rejects with 401 when no valid
/// session cookie is present.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_session_token(&parts.headers, &state.config.auth.cookie_name)
            .ok_or(AppError::Unauthorized)?;

        let conn = state.db.get()?;
        // No matching session is Unauthorized; any other store failure is a
        // real error and must surface (and get logged) as one.
        conn.query_row(
            "SELECT u.id, u.created_at, u.name, u.email, u.password_hash, \
                    u.is_admin, u.is_active, u.recovery_code \
             FROM sessions s JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.expires_at > ?2 AND u.is_active = 1",
            params![token, Utc::now()],
            |row| Ok(CurrentUser(user_from_row(row)?)),
        )
        .map_err(session_lookup_error)
    }
}

/// Optional user extractor — returns None instead of 401 when not
/// authenticated, for pages anonymous viewers may see.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(CurrentUser(user)) => Ok(MaybeUser(Some(user))),
            Err(AppError::Unauthorized) => Ok(MaybeUser(None)),
            Err(other) => Err(other),
        }
    }
}

fn session_lookup_error(e: rusqlite::Error) -> AppError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::Unauthorized,
        other => AppError::Database(other),
    }
}

pub(crate) fn extract_session_token<'a>(
    headers: &'a axum::http::HeaderMap,
    cookie_name: &str,
) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == cookie_name {
                Some(val)
            } else {
                None
            }
        })
}
