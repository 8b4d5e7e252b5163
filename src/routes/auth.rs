use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::session::{create_session, delete_session};
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::{extract_session_token, MaybeUser};
use crate::state::AppState;
use crate::users::NewUser;
use crate::validation::{validate_signup, ValidationErrors};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

fn session_cookie(state: &AppState, token: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        state.config.auth.cookie_name,
        token,
        state.config.auth.session_hours * 3600
    )
}

fn clear_session_cookie(state: &AppState) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
        state.config.auth.cookie_name
    )
}

fn logged_in_response(state: &AppState, user: User) -> AppResult<Response> {
    let token = create_session(&state.db, user.id, state.config.auth.session_hours)?;
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(state, &token))],
        Json(user),
    )
        .into_response())
}

#[derive(Deserialize)]
struct SignupForm {
    name: String,
    email: String,
    password: String,
}

async fn signup(State(state): State<AppState>, Json(form): Json<SignupForm>) -> AppResult<Response> {
    validate_signup(&form.name, &form.email, &form.password)?;

    let mut errors = ValidationErrors::default();
    if !state.users.is_name_available(&form.name, None).await? {
        errors.add("name", "Name is already taken");
    }
    if !state.users.is_email_available(&form.email, None).await? {
        errors.add("email", "Email is already taken");
    }
    errors.into_result()?;

    let user = state
        .users
        .insert(NewUser {
            name: form.name,
            email: form.email,
            password: form.password,
        })
        .await?;

    logged_in_response(&state, user)
}

#[derive(Deserialize)]
struct LoginForm {
    identifier: String,
    password: String,
}

async fn login(State(state): State<AppState>, Json(form): Json<LoginForm>) -> AppResult<Response> {
    // One rejection for every failure mode; do not leak which part failed.
    let user = state
        .users
        .authenticate(&form.identifier, &form.password)
        .await?
        .ok_or(AppError::Unauthorized)?;

    logged_in_response(&state, user)
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = extract_session_token(&headers, &state.config.auth.cookie_name) {
        delete_session(&state.db, token)?;
    }
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie(&state))],
    )
        .into_response())
}

async fn me(maybe_user: MaybeUser) -> Json<Option<User>> {
    Json(maybe_user.0)
}
