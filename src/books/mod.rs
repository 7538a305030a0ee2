pub mod covers;
mod dto;
pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod repo;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
