pub mod classifier;
pub mod client;
pub mod handlers;
pub mod prompt;
pub mod repo;
pub mod repo_types;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
