//! Application shell: config, logging, fatal error handling

mod config;
mod error_handling;
mod logging;

pub use config::AppConfig;
pub use error_handling::handle_fatal_error;
pub use logging::init_logging;
