//! HTTP gateway: thin axum surface over `catalogd-core`.

pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
