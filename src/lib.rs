pub mod config;
pub mod error;
pub mod filters;
pub mod handlers;
pub mod memory;
pub mod middleware;
pub mod models;
pub mod postgres;
pub mod rate_limiter;
pub mod repository;
pub mod response;
pub mod server;
pub mod token_bucket;
pub mod validation;

pub use config::Config;
pub use error::{ApiError, Result};
pub use server::create_app;
