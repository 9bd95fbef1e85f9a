use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Environment;
use crate::error::{ApiError, Result};
use crate::filters::{
    validate_filters, Filters, DEFAULT_PAGE, DEFAULT_PAGE_SIZE, DEFAULT_SORT, MOVIE_SORT_SAFELIST,
};
use crate::models::{MoviePatch, NewMovie};
use crate::rate_limiter::RateLimiter;
use crate::repository::MovieRepository;
use crate::response::{HealthResponse, MessageResponse, MovieListResponse, MovieResponse};
use crate::validation::Validator;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// Header a client may send with a PATCH to pin the version it last read
pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

/// Shared application state
pub type SharedState = Arc<AppState>;

/// Everything a request handler needs. Built once at startup.
pub struct AppState {
    pub environment: Environment,
    pub movies: Arc<dyn MovieRepository>,
    pub rate_limiter: RateLimiter,
}

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(HealthResponse::available(&state.environment.to_string()))
}

/// Create a movie
pub async fn create_movie(
    State(state): State<SharedState>,
    payload: std::result::Result<Json<NewMovie>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(input) = payload.map_err(json_rejection)?;

    let mut v = Validator::new();
    input.validate(&mut v);
    if !v.valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let movie = state.movies.insert(&input).await?;
    tracing::info!(target: "reelvault::handlers", id = movie.id, "Movie created");

    let location = format!("/v1/movies/{}", movie.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(MovieResponse { movie }),
    ))
}

/// Show one movie
pub async fn show_movie(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let id = read_id(&id)?;
    let movie = state.movies.get(id).await?;
    Ok(Json(MovieResponse { movie }))
}

/// Partially update a movie.
///
/// Only supplied fields change. If the client sends `X-Expected-Version`
/// and the stored version differs, the update is refused as a conflict;
/// a concurrent writer winning between read and write is a conflict too.
pub async fn update_movie(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: std::result::Result<Json<MoviePatch>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let id = read_id(&id)?;
    let mut movie = state.movies.get(id).await?;

    if let Some(expected) = expected_version(&headers)? {
        if expected != movie.version {
            return Err(ApiError::EditConflict);
        }
    }

    let Json(patch) = payload.map_err(json_rejection)?;
    patch.apply_to(&mut movie);

    let mut v = Validator::new();
    movie.validate(&mut v);
    if !v.valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }

    let movie = state.movies.update(&movie).await?;
    tracing::info!(
        target: "reelvault::handlers",
        id = movie.id,
        version = movie.version,
        "Movie updated"
    );

    Ok(Json(MovieResponse { movie }))
}

/// Delete a movie
pub async fn delete_movie(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let id = read_id(&id)?;
    state.movies.delete(id).await?;
    tracing::info!(target: "reelvault::handlers", id, "Movie deleted");

    Ok(Json(MessageResponse::new("movie successfully deleted")))
}

/// List movies with title search, genre filtering, sorting and pagination
pub async fn list_movies(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse> {
    let mut v = Validator::new();

    let title = read_string(&params, "title", "");
    let genres = read_csv(&params, "genres");
    let filters = Filters {
        page: read_int(&params, "page", DEFAULT_PAGE, &mut v),
        page_size: read_int(&params, "page_size", DEFAULT_PAGE_SIZE, &mut v),
        sort: read_string(&params, "sort", DEFAULT_SORT),
        sort_safelist: MOVIE_SORT_SAFELIST,
    };

    validate_filters(&mut v, &filters);
    if !v.valid() {
        return Err(ApiError::FailedValidation(v.into_errors()));
    }
    let query = filters.resolve()?;

    let (movies, metadata) = state.movies.list(&title, &genres, query).await?;
    Ok(Json(MovieListResponse { movies, metadata }))
}

/// Fallback for unknown routes
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Positive integer id from a path segment; anything else is a 404
fn read_id(raw: &str) -> Result<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

fn expected_version(headers: &HeaderMap) -> Result<Option<i32>> {
    let Some(value) = headers.get(EXPECTED_VERSION_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<i32>().ok())
        .map(Some)
        .ok_or_else(|| {
            ApiError::BadRequest("X-Expected-Version must be an integer".to_string())
        })
}

fn read_string(params: &HashMap<String, String>, key: &str, default: &str) -> String {
    match params.get(key) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => default.to_string(),
    }
}

fn read_csv(params: &HashMap<String, String>, key: &str) -> Vec<String> {
    match params.get(key) {
        Some(value) if !value.is_empty() => value.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn read_int(params: &HashMap<String, String>, key: &str, default: i64, v: &mut Validator) -> i64 {
    match params.get(key) {
        Some(value) if !value.is_empty() => value.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer");
            default
        }),
        _ => default,
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    let message = match &rejection {
        JsonRejection::JsonSyntaxError(err) if is_empty_body(&err.body_text()) => {
            "body must not be empty".to_string()
        }
        JsonRejection::JsonSyntaxError(_) => "body contains badly-formed JSON".to_string(),
        JsonRejection::JsonDataError(err) => err.body_text(),
        JsonRejection::MissingJsonContentType(_) => {
            "body must be sent with Content-Type: application/json".to_string()
        }
        JsonRejection::BytesRejection(_) => {
            format!("body must not be larger than {MAX_BODY_BYTES} bytes")
        }
        _ => rejection.body_text(),
    };
    ApiError::BadRequest(message)
}

/// serde_json reports end of input before the first byte for an empty body
fn is_empty_body(detail: &str) -> bool {
    detail.ends_with("EOF while parsing a value at line 1 column 0")
}
