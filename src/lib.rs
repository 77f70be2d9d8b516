pub mod auth;
pub mod config;
pub mod maintenance;
pub mod response;
pub mod routes;
pub mod state;

pub use config::{Config, ConfigError};
pub use maintenance::Maintainer;
pub use response::{ApiError, ApiJson};
pub use routes::create_router;
pub use state::AppState;
