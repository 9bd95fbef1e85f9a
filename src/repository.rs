use crate::filters::{ListQuery, Metadata};
use crate::models::{Movie, NewMovie};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Ceiling for a single store operation
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("storage operation timed out")]
    Timeout,
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence operations over movies.
///
/// Callers validate business rules before `insert`/`update`; repositories
/// only enforce identity and version semantics.
#[async_trait]
pub trait MovieRepository: Send + Sync {
    /// Fetch one movie. Ids below 1 are `NotFound`.
    async fn get(&self, id: i64) -> RepoResult<Movie>;

    /// Store a new movie, returning it with id, creation time and version 1.
    async fn insert(&self, movie: &NewMovie) -> RepoResult<Movie>;

    /// Persist `movie` if the stored version still equals `movie.version`.
    ///
    /// Returns the movie with its version bumped by one. A missing row or a
    /// version that moved on is an `EditConflict`.
    async fn update(&self, movie: &Movie) -> RepoResult<Movie>;

    /// Remove a movie. Zero affected rows is `NotFound`.
    async fn delete(&self, id: i64) -> RepoResult<()>;

    /// One page of movies matching `title` (full-text, empty = any) and
    /// containing every tag in `genres` (empty = any). Ordered by the query's
    /// column with `id ASC` as tiebreak. Metadata reflects the full filtered
    /// count, not the page.
    async fn list(
        &self,
        title: &str,
        genres: &[String],
        query: ListQuery,
    ) -> RepoResult<(Vec<Movie>, Metadata)>;
}

/// Run `op`, failing with [`RepoError::Timeout`] if it outlives `deadline`.
pub async fn with_deadline<T, F>(deadline: Duration, op: F) -> RepoResult<T>
where
    F: Future<Output = RepoResult<T>>,
{
    tokio::time::timeout(deadline, op)
        .await
        .map_err(|_| RepoError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_expiry_is_timeout() {
        let result: RepoResult<()> = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(RepoError::Timeout)));
    }

    #[tokio::test]
    async fn test_deadline_passes_through_results() {
        let ok = with_deadline(QUERY_TIMEOUT, async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let not_found: RepoResult<()> =
            with_deadline(QUERY_TIMEOUT, async { Err(RepoError::NotFound) }).await;
        assert!(matches!(not_found, Err(RepoError::NotFound)));
    }
}
