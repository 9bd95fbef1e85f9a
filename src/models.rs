//! The movie entity, its create/patch payloads and business-rule validation.

use crate::validation::{unique, Validator};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_TITLE_BYTES: usize = 500;
pub const MIN_YEAR: i32 = 2000;
pub const MAX_GENRES: usize = 5;

/// A stored movie.
///
/// `id`, `created_at` and `version` are assigned by the store. `version`
/// starts at 1 and moves up by exactly one on every successful update.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub genres: Vec<String>,
    pub version: i32,
}

/// Create payload. Missing fields default to empty values so validation can
/// report them as not provided.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NewMovie {
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub genres: Vec<String>,
}

/// Partial update payload. `None` leaves the stored value alone; `Some`
/// overwrites it, even with an empty or zero value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoviePatch {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<i32>,
    pub genres: Option<Vec<String>>,
}

impl MoviePatch {
    pub fn apply_to(self, movie: &mut Movie) {
        if let Some(title) = self.title {
            movie.title = title;
        }
        if let Some(year) = self.year {
            movie.year = year;
        }
        if let Some(runtime) = self.runtime {
            movie.runtime = runtime;
        }
        if let Some(genres) = self.genres {
            movie.genres = genres;
        }
    }
}

impl NewMovie {
    pub fn validate(&self, v: &mut Validator) {
        validate_movie(v, &self.title, self.year, self.runtime, &self.genres);
    }
}

impl Movie {
    pub fn validate(&self, v: &mut Validator) {
        validate_movie(v, &self.title, self.year, self.runtime, &self.genres);
    }
}

/// Business rules shared by create and update.
///
/// The last failing check for a field is the one reported, so checks are
/// ordered to leave the most useful message standing.
pub fn validate_movie(v: &mut Validator, title: &str, year: i32, runtime: i32, genres: &[String]) {
    v.check(
        title.len() <= MAX_TITLE_BYTES,
        "title",
        "must not be more than 500 bytes long",
    );
    v.check(!title.is_empty(), "title", "must be provided");

    v.check(year <= Utc::now().year(), "year", "must not be in the future");
    v.check(year >= MIN_YEAR, "year", "must be 2000 or later");
    v.check(year != 0, "year", "must be provided");

    v.check(runtime > 0, "runtime", "must be a positive integer");
    v.check(runtime != 0, "runtime", "must be provided");

    // A duplicate is reported even when the list is also too long.
    v.check(genres.len() <= MAX_GENRES, "genres", "must not contain more than 5 genres");
    v.check(!genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(unique(genres), "genres", "must not contain duplicate values");
}
