//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `settings.rs`: environment configuration for the binary
//! - `services.rs`: store wiring (in-memory for dev/tests, Postgres otherwise)
//! - `routes/`: HTTP handlers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};

pub mod errors;
pub mod routes;
pub mod services;
pub mod settings;

pub use services::AppServices;
pub use settings::ApiSettings;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the black-box tests).
pub fn build_app(services: AppServices) -> Router {
    let services = Arc::new(services);

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/v1/triggers", routes::triggers::router())
        .layer(Extension(services))
}
