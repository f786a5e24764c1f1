pub mod handlers;
pub mod metrics_handler;
pub mod router;

pub use handlers::AppState;
pub use router::create_router;
