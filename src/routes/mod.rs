pub mod auth;
pub mod photos;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().merge(photos::router()).merge(auth::router())
}
