pub mod companion;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod prompt;
pub mod provider;
pub mod server;
pub mod subtitles;
pub mod timestamp;

pub use config::AppConfig;
pub use error::CompanionError;
pub use server::run_server;
