pub mod health;
pub mod live;
pub mod sessions;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest(
            "/api",
            Router::new()
                .merge(sessions::router())
                .merge(live::router())
                .merge(crate::openapi::router()),
        )
        .with_state(state)
}
