use crate::config::Config;
use crate::error::ApiError;
use crate::handlers::{
    create_movie, delete_movie, health_check, list_movies, not_found, show_movie, update_movie,
    AppState, SharedState, MAX_BODY_BYTES,
};
use crate::middleware::{logging_middleware, method_not_allowed_middleware, rate_limit_middleware};
use crate::rate_limiter::RateLimiter;
use crate::repository::MovieRepository;
use axum::extract::DefaultBodyLimit;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Router};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct Server {
    app: Router,
    addr: SocketAddr,
    rate_limiter: RateLimiter,
}

impl Server {
    pub fn new(config: &Config, movies: Arc<dyn MovieRepository>) -> Self {
        let rate_limiter = RateLimiter::new(config.limiter());
        let state: SharedState = Arc::new(AppState {
            environment: config.environment,
            movies,
            rate_limiter: rate_limiter.clone(),
        });

        Self {
            app: create_app(state),
            addr: config.bind_addr(),
            rate_limiter,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        tracing::info!("reelvault server starting on {}", self.addr);
        tracing::info!("Health check available at /v1/health");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = if self.rate_limiter.is_enabled() {
            Some(self.rate_limiter.spawn_sweeper(shutdown_rx))
        } else {
            tracing::info!("Rate limiter disabled");
            None
        };

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        let _ = shutdown_tx.send(true);
        if let Some(sweeper) = sweeper {
            if let Err(err) = sweeper.await {
                tracing::warn!(error = %err, "Idle sweeper ended abnormally");
            }
        }

        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Build the router: `/v1` routes behind admission control, with JSON
/// errors for unknown routes, wrong methods and handler panics.
pub fn create_app(state: SharedState) -> Router {
    let v1 = Router::new()
        .route("/health", get(health_check))
        .route("/movies", get(list_movies).post(create_movie))
        .route(
            "/movies/:id",
            get(show_movie).patch(update_movie).delete(delete_movie),
        );

    Router::new()
        .nest("/v1", v1)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(method_not_allowed_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
