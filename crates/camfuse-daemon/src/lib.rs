//! camfuse daemon library: HTTP control surface over the camera registry.

pub mod http_server;

pub use http_server::{create_router, run_http_server, AppState};
