pub mod captcha;
pub mod clock;
pub mod config;
pub mod content;
pub mod crypto;
pub mod error;
pub mod reliability;
pub mod share;
pub mod store;
pub mod timelock;
pub mod vault;
pub mod web;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
