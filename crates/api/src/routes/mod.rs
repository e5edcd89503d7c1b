//! HTTP handlers, one module per resource.

pub mod activity;
pub mod items;
pub mod ops;
pub mod payments;
pub mod reviews;
pub mod transactions;

use std::str::FromStr;

use serde::Deserialize;
use store::Page;

use crate::error::ApiError;

/// Parses a path segment into one of the typed ids.
pub(crate) fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = uuid::Error>,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}

/// `?limit=&offset=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl From<PageParams> for Page {
    fn from(params: PageParams) -> Self {
        Page::new(
            params.limit.unwrap_or(Page::DEFAULT_LIMIT),
            params.offset.unwrap_or(0),
        )
    }
}
