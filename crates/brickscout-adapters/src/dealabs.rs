//! Dealabs search pages: one `<article>` per deal, fields embedded as JSON in `data-vue2`.

use async_trait::async_trait;
use brickscout_core::{compute_discount, RawListing};
use brickscout_storage::header::{HeaderMap, HeaderValue, ACCEPT};
use brickscout_storage::{HttpFetcher, Url};
use chrono::DateTime;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{
    json_f64, json_i64, json_id, json_str, text_or_none, AdapterError,
    ListingPage, ListingQuery, ShapeError, SourceAdapter,
};

pub const SOURCE_ID: &str = "dealabs";
pub const DEFAULT_ENDPOINT: &str = "https://www.dealabs.com/search";

const ARTICLE_SELECTOR: &str = "div.js-threadList article";
const LINK_SELECTOR: &str = r#"a[data-t="threadLink"]"#;
const PAYLOAD_SELECTOR: &str = "div.js-vue2";

#[derive(Debug, Clone)]
pub struct DealabsAdapter {
    http: HttpFetcher,
    endpoint: String,
}

impl DealabsAdapter {
    pub fn new(http: HttpFetcher, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub fn page_url(&self, query: &ListingQuery) -> Result<Url, AdapterError> {
        let page = query.page.to_string();
        Url::parse_with_params(
            &self.endpoint,
            &[("q", query.search.as_str()), ("page", page.as_str())],
        )
        .map_err(|e| AdapterError::Config(format!("dealabs endpoint {}: {e}", self.endpoint)))
    }
}

#[async_trait]
impl SourceAdapter for DealabsAdapter {
    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }

    async fn fetch(&self, query: &ListingQuery) -> Result<ListingPage, AdapterError> {
        let url = self.page_url(query)?;
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
        let resp = self.http.fetch_text(SOURCE_ID, url.as_str(), headers).await?;
        parse_search_page(&resp.body)
    }
}

fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Shape(format!("selector {css}: {e}")))
}

/// Every article is extracted on its own; a broken one never hides its siblings.
pub fn parse_search_page(html: &str) -> Result<ListingPage, AdapterError> {
    let document = Html::parse_document(html);
    let article_sel = selector(ARTICLE_SELECTOR)?;
    let link_sel = selector(LINK_SELECTOR)?;
    let payload_sel = selector(PAYLOAD_SELECTOR)?;

    let page = ListingPage::from_extracted(
        document
            .select(&article_sel)
            .map(|article| extract_article(article, &link_sel, &payload_sel)),
    );
    debug!(
        listings = page.listings.len(),
        shape_failures = page.shape_failures.len(),
        "parsed dealabs page"
    );
    Ok(page)
}

fn extract_article(
    article: ElementRef<'_>,
    link_sel: &Selector,
    payload_sel: &Selector,
) -> Result<RawListing, ShapeError> {
    let link = article
        .select(link_sel)
        .next()
        .and_then(|n| n.value().attr("href"))
        .and_then(text_or_none)
        .ok_or(ShapeError::Missing("thread link"))?;

    let payload = article
        .select(payload_sel)
        .next()
        .and_then(|n| n.value().attr("data-vue2"))
        .ok_or(ShapeError::Missing("data-vue2 payload"))?;
    let value: JsonValue =
        serde_json::from_str(payload).map_err(|e| ShapeError::Malformed(e.to_string()))?;
    let thread = value
        .pointer("/props/thread")
        .filter(|t| t.is_object())
        .ok_or(ShapeError::Missing("props.thread"))?;

    let title = json_str(thread, &["title"])
        .and_then(text_or_none)
        .ok_or(ShapeError::Missing("thread title"))?;
    let price = json_f64(thread, &["price"]);
    let retail = json_f64(thread, &["nextBestPrice"]);

    Ok(RawListing {
        source_ref: json_id(thread, &["threadId"]),
        title,
        link,
        price,
        retail,
        discount: compute_discount(price, retail),
        temperature: json_f64(thread, &["temperature"]),
        comments: json_i64(thread, &["commentCount"]).and_then(|c| u32::try_from(c).ok()),
        published: published_at(thread),
        photo: main_image(thread),
    })
}

/// `publishedAt` is unix seconds; anything else is handed on as text.
fn published_at(thread: &JsonValue) -> Option<String> {
    json_i64(thread, &["publishedAt"])
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc2822())
        .or_else(|| json_str(thread, &["publishedAt"]).and_then(text_or_none))
}

/// `mainImage` is either a plain reference or an object with `path` + `name`.
fn main_image(thread: &JsonValue) -> Option<String> {
    if let Some(s) = json_str(thread, &["mainImage"]) {
        return text_or_none(s);
    }
    let path = json_str(thread, &["mainImage", "path"])?;
    let name = json_str(thread, &["mainImage", "name"])?;
    Some(format!("{}/{}", path.trim_end_matches('/'), name))
}
