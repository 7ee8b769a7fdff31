pub mod config;
pub mod observability;
pub mod server;

pub use observability::init_tracing;
pub use server::{KeygateServer, ServerBuilder, app_router, build_app, build_state};
