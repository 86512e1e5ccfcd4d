pub mod config;
pub mod logging;
pub mod metrics;
pub mod routes;

pub use config::AppConfig;
pub use metrics::Metrics;
pub use routes::{AppState, router};
