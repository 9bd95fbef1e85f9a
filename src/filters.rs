//! Pagination and sorting for listing endpoints.
//!
//! Raw query parameters land in [`Filters`]. They are checked with
//! [`validate_filters`] and then turned into a [`ListQuery`] by
//! [`Filters::resolve`]. Repositories only accept a `ListQuery`, so an
//! unvalidated sort token can never reach a query string: the column comes
//! from the closed [`SortColumn`] enum, never from the raw input.

use crate::validation::{permitted, ValidationErrors, Validator};
use serde::Serialize;

pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const DEFAULT_SORT: &str = "id";

/// Sort tokens accepted by the movie listing endpoint
pub const MOVIE_SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

/// Columns a listing may be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Title,
    Year,
    Runtime,
}

impl SortColumn {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "id" => Some(SortColumn::Id),
            "title" => Some(SortColumn::Title),
            "year" => Some(SortColumn::Year),
            "runtime" => Some(SortColumn::Runtime),
            _ => None,
        }
    }

    /// SQL identifier for this column
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortColumn::Id => "id",
            SortColumn::Title => "title",
            SortColumn::Year => "year",
            SortColumn::Runtime => "runtime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Raw, unvalidated pagination and sort input
#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            sort: DEFAULT_SORT.to_string(),
            sort_safelist: MOVIE_SORT_SAFELIST,
        }
    }
}

impl Filters {
    /// Column named by the sort token, or `None` when the token is not safelisted
    pub fn sort_column(&self) -> Option<SortColumn> {
        if !permitted(&self.sort.as_str(), self.sort_safelist) {
            return None;
        }
        SortColumn::from_name(self.sort.trim_start_matches('-'))
    }

    pub fn sort_direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    /// Validate and turn the filters into a query plan.
    pub fn resolve(&self) -> Result<ListQuery, ValidationErrors> {
        let mut v = Validator::new();
        validate_filters(&mut v, self);
        if !v.valid() {
            return Err(v.into_errors());
        }

        // A safelisted token that does not name a known column is a
        // misconfigured safelist, so it is still reported as a bad sort.
        let column = match self.sort_column() {
            Some(column) => column,
            None => {
                v.add_error("sort", "invalid sort value");
                return Err(v.into_errors());
            }
        };

        Ok(ListQuery {
            column,
            direction: self.sort_direction(),
            page: self.page,
            page_size: self.page_size,
        })
    }
}

/// Record every pagination/sort failure on `v`.
pub fn validate_filters(v: &mut Validator, f: &Filters) {
    v.check(f.page > 0, "page", "must be greater than zero");
    v.check(f.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
    v.check(f.page_size > 0, "page_size", "must be greater than zero");
    v.check(f.page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");
    v.check(
        permitted(&f.sort.as_str(), f.sort_safelist),
        "sort",
        "invalid sort value",
    );
}

/// A validated listing plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub column: SortColumn,
    pub direction: SortDirection,
    pub page: i64,
    pub page_size: i64,
}

impl ListQuery {
    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            column: SortColumn::Id,
            direction: SortDirection::Asc,
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Pagination metadata returned next to a listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub last_page: i64,
    pub total_records: i64,
}

pub fn calculate_metadata(total_records: i64, page: i64, page_size: i64) -> Metadata {
    if total_records == 0 || page_size <= 0 {
        return Metadata::default();
    }

    Metadata {
        current_page: page,
        page_size,
        last_page: (total_records + page_size - 1) / page_size,
        total_records,
    }
}
