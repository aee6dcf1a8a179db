mod dto;
mod extractors;
pub mod handlers;
mod repo;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
