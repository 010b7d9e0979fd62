pub mod config;
pub mod cors;
pub mod db;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod validation;

pub use config::ServerConfig;
pub use db::SqliteStore;
pub use error::ApiError;
pub use state::AppState;
