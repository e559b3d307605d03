//! Core listing model and normalization rules for brickscout.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod normalize;

pub use normalize::{
    canonical_date, compute_discount, extract_set_id, listing_identity, normalize_listing,
};

pub const CRATE_NAME: &str = "brickscout-core";

/// Marketplace record after shape extraction, before normalization.
///
/// Adapters guarantee `title` and `link` are present; every other field is
/// whatever the marketplace happened to provide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub source_ref: Option<String>,
    pub title: String,
    pub link: String,
    pub price: Option<f64>,
    pub retail: Option<f64>,
    pub discount: i64,
    pub temperature: Option<f64>,
    pub comments: Option<u32>,
    pub published: Option<String>,
    pub photo: Option<String>,
}

impl RawListing {
    /// Minimal record with only the fields every adapter must supply.
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            source_ref: None,
            title: title.into(),
            link: link.into(),
            price: None,
            retail: None,
            discount: 0,
            temperature: None,
            comments: None,
            published: None,
            photo: None,
        }
    }
}

/// Canonical listing handed to the document writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedListing {
    pub set_id: String,
    pub title: String,
    pub link: String,
    pub price: Option<f64>,
    pub retail: Option<f64>,
    pub discount: i64,
    pub temperature: Option<f64>,
    pub comments: Option<u32>,
    pub published: Option<String>,
    pub identity: Uuid,
    pub photo: Option<String>,
    pub source_ref: Option<String>,
}

/// Schedule pipeline output: set id -> listings in fetch order.
pub type SalesBySet = BTreeMap<String, Vec<NormalizedListing>>;

/// Pagination pipeline output: listings in page order.
pub type DealList = Vec<NormalizedListing>;
