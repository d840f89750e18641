//! Page-based pagination for list endpoints.
//!
//! Query parameters are `page` (1-indexed, default 1) and `limit` (default
//! 10, also used for `0`). A negative `limit`, conventionally `-1`, returns
//! every row on a single page and the response reports the limit as `"all"`.
//!
//! ```json
//! {
//!   "results": [...],
//!   "page": 1,
//!   "limit": 10,
//!   "totalPages": 3,
//!   "totalResults": 27
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

pub const DEFAULT_LIMIT: i64 = 10;

/// Empty query strings (`?page=`) are treated as absent.
pub fn deserialize_optional_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s.trim().parse::<i64>().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    /// `None` means unbounded.
    pub limit: Option<i64>,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = match limit {
            None | Some(0) => Some(DEFAULT_LIMIT),
            Some(l) if l < 0 => None,
            Some(l) => Some(l),
        };
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        match self.limit {
            Some(limit) => (self.page - 1) * limit,
            None => 0,
        }
    }

    pub fn total_pages(&self, total_results: i64) -> i64 {
        match self.limit {
            Some(limit) => (total_results + limit - 1) / limit,
            None => 1,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Either a numeric page size or `"all"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLimit {
    Count(i64),
    All,
}

impl Serialize for PageLimit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            PageLimit::Count(n) => serializer.serialize_i64(*n),
            PageLimit::All => serializer.serialize_str("all"),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub results: Vec<T>,
    pub page: i64,
    #[schema(value_type = Object)]
    pub limit: PageLimit,
    pub total_pages: i64,
    pub total_results: i64,
}

impl<T> Paginated<T> {
    pub fn new(results: Vec<T>, request: PageRequest, total_results: i64) -> Self {
        let limit = match request.limit {
            Some(l) => PageLimit::Count(l),
            None => PageLimit::All,
        };

        Self {
            results,
            page: request.page,
            limit,
            total_pages: request.total_pages(total_results),
            total_results,
        }
    }
}
