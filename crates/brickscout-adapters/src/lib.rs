//! Source adapter contract + marketplace adapters.

use async_trait::async_trait;
use brickscout_core::RawListing;
use brickscout_storage::FetchError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub mod dealabs;
pub mod vinted;

pub use dealabs::DealabsAdapter;
pub use vinted::VintedAdapter;

pub const CRATE_NAME: &str = "brickscout-adapters";

/// What to fetch: a search term plus a 1-based page number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingQuery {
    pub search: String,
    pub page: u32,
}

impl ListingQuery {
    pub fn new(search: impl Into<String>, page: u32) -> Self {
        Self {
            search: search.into(),
            page,
        }
    }
}

/// Why a single record could not be lifted out of an otherwise good response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeFailure {
    /// Index of the record within the page.
    pub position: usize,
    pub error: ShapeError,
}

/// Records extracted from one response, with per-record extraction failures kept apart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub listings: Vec<RawListing>,
    pub shape_failures: Vec<ShapeFailure>,
}

impl ListingPage {
    pub fn from_extracted(results: impl IntoIterator<Item = Result<RawListing, ShapeError>>) -> Self {
        let mut page = Self::default();
        for (position, result) in results.into_iter().enumerate() {
            match result {
                Ok(listing) => page.listings.push(listing),
                Err(error) => page.shape_failures.push(ShapeFailure { position, error }),
            }
        }
        page
    }

    /// True when the response carried no records at all, well-formed or not.
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty() && self.shape_failures.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.listings.len() + self.shape_failures.len()
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unexpected document shape: {0}")]
    Shape(String),
    #[error("invalid adapter configuration: {0}")]
    Config(String),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    async fn fetch(&self, query: &ListingQuery) -> Result<ListingPage, AdapterError>;
}

fn text_or_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn json_at<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    if cur.is_null() {
        None
    } else {
        Some(cur)
    }
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    json_at(value, path)?.as_str()
}

/// Numbers arrive as JSON numbers or as decimal strings depending on the endpoint.
fn json_f64(value: &JsonValue, path: &[&str]) -> Option<f64> {
    match json_at(value, path)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn json_i64(value: &JsonValue, path: &[&str]) -> Option<i64> {
    match json_at(value, path)? {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Ids are sometimes numeric, sometimes strings; keep them as text.
fn json_id(value: &JsonValue, path: &[&str]) -> Option<String> {
    match json_at(value, path)? {
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::String(s) => text_or_none(s),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::{Path, PathBuf};

    pub fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .expect("workspace root")
    }

    pub fn read_fixture(source_id: &str, name: &str) -> String {
        let path = workspace_root().join("fixtures").join(source_id).join(name);
        fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_keeps_good_records_and_tags_failures_by_position() {
        let page = ListingPage::from_extracted(vec![
            Ok(RawListing::new("LEGO 75402", "https://a.test/1")),
            Err(ShapeError::Missing("title")),
            Ok(RawListing::new("LEGO 10363", "https://a.test/3")),
        ]);
        assert_eq!(page.listings.len(), 2);
        assert_eq!(
            page.shape_failures,
            vec![ShapeFailure {
                position: 1,
                error: ShapeError::Missing("title")
            }]
        );
        assert!(!page.is_empty());
        assert_eq!(page.record_count(), 3);
    }

    #[test]
    fn page_of_only_failures_is_not_empty() {
        let page = ListingPage::from_extracted(vec![Err(ShapeError::Malformed("x".into()))]);
        assert!(page.listings.is_empty());
        assert!(!page.is_empty());
        assert!(ListingPage::default().is_empty());
    }

    #[test]
    fn json_numbers_accept_strings_and_ignore_null() {
        let v = json!({"a": {"amount": "12.50"}, "b": 7, "c": null, "d": "n/a"});
        assert_eq!(json_f64(&v, &["a", "amount"]), Some(12.5));
        assert_eq!(json_f64(&v, &["b"]), Some(7.0));
        assert_eq!(json_f64(&v, &["c"]), None);
        assert_eq!(json_f64(&v, &["d"]), None);
        assert_eq!(json_id(&v, &["b"]).as_deref(), Some("7"));
    }
}
