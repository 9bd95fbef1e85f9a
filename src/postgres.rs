//! PostgreSQL-backed movie repository.
//!
//! Every statement is a single round trip and runs under the repository
//! deadline. Optimistic locking is done by the store itself: updates are
//! guarded by `id AND version` and report zero matched rows as an edit
//! conflict. The only dynamic SQL is the `ORDER BY` clause, and it is built
//! from the closed `SortColumn`/`SortDirection` enums, never from request
//! text.

use crate::config::DatabaseConfig;
use crate::filters::{calculate_metadata, ListQuery, Metadata};
use crate::models::{Movie, NewMovie};
use crate::repository::{with_deadline, MovieRepository, RepoError, RepoResult, QUERY_TIMEOUT};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MIGRATE_TIMEOUT: Duration = Duration::from_secs(30);

const MOVIE_COLUMNS: &str = "id, created_at, title, year, runtime, genres, version";

const LIST_PREDICATE: &str = "(to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '') \
     AND (genres @> $2 OR $2 = '{}')";

#[derive(Debug, FromRow)]
struct ListedMovie {
    total_records: i64,
    #[sqlx(flatten)]
    movie: Movie,
}

#[derive(Debug, Clone)]
pub struct PgMovieRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PgMovieRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            timeout: QUERY_TIMEOUT,
        }
    }

    /// Open a pool, check it answers and apply the embedded migrations.
    ///
    /// The DSN may carry credentials and is never logged.
    pub async fn connect(config: &DatabaseConfig) -> RepoResult<Self> {
        let pool = with_deadline(CONNECT_TIMEOUT, async {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_open_conns)
                .min_connections(config.max_idle_conns.min(config.max_open_conns))
                .idle_timeout(Some(config.max_idle_time))
                .acquire_timeout(CONNECT_TIMEOUT)
                .connect(&config.dsn)
                .await?;
            sqlx::query("SELECT 1").execute(&pool).await?;
            Ok::<_, RepoError>(pool)
        })
        .await?;

        tracing::info!(
            target: "reelvault::postgres",
            max_open_conns = config.max_open_conns,
            max_idle_conns = config.max_idle_conns,
            "Database connection pool established"
        );

        with_deadline(MIGRATE_TIMEOUT, async {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(sqlx::Error::from)?;
            Ok::<_, RepoError>(())
        })
        .await?;

        Ok(Self::new(pool))
    }

    async fn count(&self, title: &str, genres: &[String]) -> RepoResult<i64> {
        let sql = format!("SELECT count(*) FROM movies WHERE {LIST_PREDICATE}");
        let total: i64 = sqlx::query_scalar(&sql)
            .bind(title)
            .bind(genres)
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}

/// Listing statement for `query`. `$1` title, `$2` genres, `$3` limit, `$4` offset.
fn list_sql(query: &ListQuery) -> String {
    format!(
        "SELECT count(*) OVER() AS total_records, {MOVIE_COLUMNS} \
         FROM movies \
         WHERE {LIST_PREDICATE} \
         ORDER BY {} {}, id ASC \
         LIMIT $3 OFFSET $4",
        query.column.as_sql(),
        query.direction.as_sql(),
    )
}

#[async_trait]
impl MovieRepository for PgMovieRepository {
    async fn get(&self, id: i64) -> RepoResult<Movie> {
        if id < 1 {
            return Err(RepoError::NotFound);
        }

        let sql = format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1");
        with_deadline(self.timeout, async {
            sqlx::query_as::<_, Movie>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(RepoError::NotFound)
        })
        .await
    }

    async fn insert(&self, movie: &NewMovie) -> RepoResult<Movie> {
        let sql = format!(
            "INSERT INTO movies (title, year, runtime, genres) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {MOVIE_COLUMNS}"
        );
        with_deadline(self.timeout, async {
            let stored = sqlx::query_as::<_, Movie>(&sql)
                .bind(&movie.title)
                .bind(movie.year)
                .bind(movie.runtime)
                .bind(&movie.genres)
                .fetch_one(&self.pool)
                .await?;
            Ok::<_, RepoError>(stored)
        })
        .await
    }

    async fn update(&self, movie: &Movie) -> RepoResult<Movie> {
        let sql = format!(
            "UPDATE movies \
             SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1 \
             WHERE id = $5 AND version = $6 \
             RETURNING {MOVIE_COLUMNS}"
        );
        with_deadline(self.timeout, async {
            sqlx::query_as::<_, Movie>(&sql)
                .bind(&movie.title)
                .bind(movie.year)
                .bind(movie.runtime)
                .bind(&movie.genres)
                .bind(movie.id)
                .bind(movie.version)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(RepoError::EditConflict)
        })
        .await
    }

    async fn delete(&self, id: i64) -> RepoResult<()> {
        if id < 1 {
            return Err(RepoError::NotFound);
        }

        with_deadline(self.timeout, async {
            let result = sqlx::query("DELETE FROM movies WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok::<_, RepoError>(())
        })
        .await
    }

    async fn list(
        &self,
        title: &str,
        genres: &[String],
        query: ListQuery,
    ) -> RepoResult<(Vec<Movie>, Metadata)> {
        let sql = list_sql(&query);
        with_deadline(self.timeout, async {
            let rows = sqlx::query_as::<_, ListedMovie>(&sql)
                .bind(title)
                .bind(genres)
                .bind(query.limit())
                .bind(query.offset())
                .fetch_all(&self.pool)
                .await?;

            // The window count is only visible on returned rows; a page past
            // the end needs its own count.
            let total_records = match rows.first() {
                Some(row) => row.total_records,
                None if query.offset() > 0 => self.count(title, genres).await?,
                None => 0,
            };

            let movies: Vec<Movie> = rows.into_iter().map(|row| row.movie).collect();
            let metadata = calculate_metadata(total_records, query.page, query.page_size);
            Ok::<_, RepoError>((movies, metadata))
        })
        .await
    }
}
