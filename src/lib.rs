pub mod app;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod scheduler;
pub mod server;

pub use error::{AppError, Result};
