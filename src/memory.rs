//! In-process movie repository.
//!
//! Used when no database DSN is configured and as the store behind the HTTP
//! tests. It mirrors the PostgreSQL repository's semantics: 'simple'
//! full-text title matching, genre containment, safelisted ordering with an
//! `id ASC` tiebreak and version-guarded updates.

use crate::filters::{calculate_metadata, ListQuery, Metadata, SortColumn, SortDirection};
use crate::models::{Movie, NewMovie};
use crate::repository::{MovieRepository, RepoError, RepoResult};
use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::{LazyLock, Mutex, MutexGuard};

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("word pattern is valid"));

#[derive(Debug, Default)]
struct Table {
    last_id: i64,
    rows: BTreeMap<i64, Movie>,
}

#[derive(Debug, Default)]
pub struct InMemoryMovieRepository {
    table: Mutex<Table>,
}

impl InMemoryMovieRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Lower-cased words, the way the 'simple' text search configuration splits them
fn lexemes(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|word| word.as_str().to_lowercase())
        .collect()
}

fn title_matches(title: &str, search: &str) -> bool {
    if search.is_empty() {
        return true;
    }
    let wanted = lexemes(search);
    if wanted.is_empty() {
        return false;
    }
    let present: HashSet<String> = lexemes(title).into_iter().collect();
    wanted.iter().all(|word| present.contains(word))
}

fn genres_match(movie_genres: &[String], required: &[String]) -> bool {
    required.iter().all(|genre| movie_genres.contains(genre))
}

fn compare(a: &Movie, b: &Movie, query: &ListQuery) -> Ordering {
    let primary = match query.column {
        SortColumn::Id => a.id.cmp(&b.id),
        SortColumn::Title => a.title.cmp(&b.title),
        SortColumn::Year => a.year.cmp(&b.year),
        SortColumn::Runtime => a.runtime.cmp(&b.runtime),
    };
    let primary = match query.direction {
        SortDirection::Asc => primary,
        SortDirection::Desc => primary.reverse(),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl MovieRepository for InMemoryMovieRepository {
    async fn get(&self, id: i64) -> RepoResult<Movie> {
        if id < 1 {
            return Err(RepoError::NotFound);
        }
        self.lock().rows.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn insert(&self, movie: &NewMovie) -> RepoResult<Movie> {
        let mut table = self.lock();
        table.last_id += 1;

        let stored = Movie {
            id: table.last_id,
            created_at: Utc::now().trunc_subsecs(0),
            title: movie.title.clone(),
            year: movie.year,
            runtime: movie.runtime,
            genres: movie.genres.clone(),
            version: 1,
        };
        table.rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, movie: &Movie) -> RepoResult<Movie> {
        let mut table = self.lock();
        let row = match table.rows.get_mut(&movie.id) {
            Some(row) if row.version == movie.version => row,
            _ => return Err(RepoError::EditConflict),
        };

        row.title = movie.title.clone();
        row.year = movie.year;
        row.runtime = movie.runtime;
        row.genres = movie.genres.clone();
        row.version += 1;
        Ok(row.clone())
    }

    async fn delete(&self, id: i64) -> RepoResult<()> {
        if id < 1 {
            return Err(RepoError::NotFound);
        }
        match self.lock().rows.remove(&id) {
            Some(_) => Ok(()),
            None => Err(RepoError::NotFound),
        }
    }

    async fn list(
        &self,
        title: &str,
        genres: &[String],
        query: ListQuery,
    ) -> RepoResult<(Vec<Movie>, Metadata)> {
        let mut matching: Vec<Movie> = {
            let table = self.lock();
            table
                .rows
                .values()
                .filter(|movie| title_matches(&movie.title, title))
                .filter(|movie| genres_match(&movie.genres, genres))
                .cloned()
                .collect()
        };
        matching.sort_by(|a, b| compare(a, b, &query));

        let total_records = matching.len() as i64;
        let movies = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect();

        Ok((movies, calculate_metadata(total_records, query.page, query.page_size)))
    }
}
