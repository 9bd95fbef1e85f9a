use crate::filters::Metadata;
use crate::models::Movie;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MovieResponse {
    pub movie: Movie,
}

#[derive(Debug, Serialize)]
pub struct MovieListResponse {
    pub movies: Vec<Movie>,
    pub metadata: Metadata,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub environment: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub system_info: SystemInfo,
}

impl HealthResponse {
    pub fn available(environment: &str) -> Self {
        Self {
            status: "available".to_string(),
            system_info: SystemInfo {
                environment: environment.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}
