pub mod config;
pub mod crypto;
pub mod error;
pub mod exchange;
pub mod extractor;
pub mod keys;
pub mod keys_api;
pub mod naming;
pub mod policy;
pub mod routes;
pub mod secrets;
pub mod store;
pub mod telemetry;

pub use config::AppConfig;
pub use routes::{api_routes, app, AppState};
