//! Vinted catalog API: JSON document with an `items` array.

use async_trait::async_trait;
use brickscout_core::RawListing;
use brickscout_storage::header::{HeaderMap, HeaderValue, ACCEPT, COOKIE};
use brickscout_storage::{HttpFetcher, Url};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::{
    json_f64, json_i64, json_id, json_str, text_or_none, AdapterError, ListingPage,
    ListingQuery, ShapeError, SourceAdapter,
};

pub const SOURCE_ID: &str = "vinted";
pub const DEFAULT_ENDPOINT: &str = "https://www.vinted.fr/api/v2/catalog/items";
pub const PER_PAGE: u32 = 96;

#[derive(Debug, Clone)]
pub struct VintedAdapter {
    http: HttpFetcher,
    endpoint: String,
    session_cookie: Option<HeaderValue>,
}

impl VintedAdapter {
    pub fn new(http: HttpFetcher, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            session_cookie: None,
        }
    }

    /// The catalog endpoint rejects anonymous clients without a session cookie.
    pub fn with_session_cookie(mut self, cookie: &str) -> Result<Self, AdapterError> {
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| AdapterError::Config(format!("vinted session cookie: {e}")))?;
        self.session_cookie = Some(value);
        Ok(self)
    }

    pub fn catalog_url(&self, query: &ListingQuery, now: DateTime<Utc>) -> Result<Url, AdapterError> {
        let page = query.page.to_string();
        let per_page = PER_PAGE.to_string();
        let time = now.timestamp().to_string();
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("page", page.as_str()),
                ("per_page", per_page.as_str()),
                ("time", time.as_str()),
                ("search_text", query.search.as_str()),
            ],
        )
        .map_err(|e| AdapterError::Config(format!("vinted endpoint {}: {e}", self.endpoint)))
    }
}

#[async_trait]
impl SourceAdapter for VintedAdapter {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    async fn fetch(&self, query: &ListingQuery) -> Result<ListingPage, AdapterError> {
        let url = self.catalog_url(query, Utc::now())?;
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(cookie) = &self.session_cookie {
            headers.insert(COOKIE, cookie.clone());
        }
        let resp = self.http.fetch_text(SOURCE_ID, url.as_str(), headers).await?;
        parse_catalog(&resp.body)
    }
}

/// A body that is not a catalog document fails as a whole; individual items fail on their own.
pub fn parse_catalog(body: &str) -> Result<ListingPage, AdapterError> {
    let value: JsonValue = serde_json::from_str(body)
        .map_err(|e| AdapterError::Shape(format!("vinted catalog is not JSON: {e}")))?;
    let items = value
        .get("items")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| AdapterError::Shape("vinted catalog has no items array".to_string()))?;
    Ok(ListingPage::from_extracted(items.iter().map(extract_item)))
}

fn extract_item(item: &JsonValue) -> Result<RawListing, ShapeError> {
    if !item.is_object() {
        return Err(ShapeError::Malformed("catalog item is not an object".to_string()));
    }
    let link = json_str(item, &["url"])
        .and_then(text_or_none)
        .ok_or(ShapeError::Missing("item url"))?;
    let title = json_str(item, &["title"])
        .and_then(text_or_none)
        .ok_or(ShapeError::Missing("item title"))?;

    let published = json_i64(item, &["photo", "high_resolution", "timestamp"])
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc2822());

    Ok(RawListing {
        source_ref: json_id(item, &["id"]),
        title,
        link,
        price: json_f64(item, &["total_item_price", "amount"]),
        retail: None,
        discount: 0,
        temperature: None,
        comments: None,
        published,
        photo: json_str(item, &["photo", "url"]).and_then(text_or_none),
    })
}
