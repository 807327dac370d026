use axum::routing::{get, post};
use axum::Router;

use crate::ServiceState;

pub mod config;
pub mod create;
pub mod open;

pub use config::ConfigRequest;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/bucket/create/s1", post(create::step_one))
        .route("/bucket/create/s2", post(create::step_two))
        .route("/bucket/open/s1", post(open::step_one))
        .route("/bucket/open/s2", post(open::step_two))
        .route("/bucket/open/config", get(config::handler))
        .with_state(state)
}
