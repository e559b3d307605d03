//! Pure normalization: set ids, dates, discounts and listing identity.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::{NormalizedListing, RawListing};

const SET_ID_LEN: usize = 5;

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// First standalone run of exactly five ASCII digits in `title`.
pub fn extract_set_id(title: &str) -> Option<String> {
    let mut current = String::new();
    let mut run_is_standalone = true;
    let mut prev: Option<char> = None;

    for ch in title.chars() {
        if ch.is_ascii_digit() {
            if current.is_empty() {
                run_is_standalone = !prev.is_some_and(is_word_char);
            }
            current.push(ch);
        } else {
            if run_is_standalone && current.len() == SET_ID_LEN && !is_word_char(ch) {
                return Some(current);
            }
            current.clear();
        }
        prev = Some(ch);
    }

    if run_is_standalone && current.len() == SET_ID_LEN {
        return Some(current);
    }
    None
}

fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()
}

/// Render `raw` as `YYYY-MM-DD` (UTC), or return it unchanged when it is not a date.
pub fn canonical_date(raw: &str) -> String {
    match parse_calendar_date(raw) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => raw.to_string(),
    }
}

/// Percentage saved against `retail`, rounded half up. Zero when there is nothing to compare.
pub fn compute_discount(price: Option<f64>, retail: Option<f64>) -> i64 {
    let (Some(price), Some(retail)) = (price, retail) else {
        return 0;
    };
    if retail == 0.0 || !retail.is_finite() || !price.is_finite() {
        return 0;
    }
    let pct = ((retail - price) / retail) * 100.0;
    (pct + 0.5).floor() as i64
}

pub fn listing_identity(link: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, link.as_bytes())
}

/// Returns `None` when the title carries no set id; such records are dropped, not errors.
pub fn normalize_listing(raw: RawListing) -> Option<NormalizedListing> {
    let set_id = extract_set_id(&raw.title)?;
    let identity = listing_identity(&raw.link);
    Some(NormalizedListing {
        set_id,
        identity,
        published: raw.published.as_deref().map(canonical_date),
        title: raw.title,
        link: raw.link,
        price: raw.price,
        retail: raw.retail,
        discount: raw.discount,
        temperature: raw.temperature,
        comments: raw.comments,
        photo: raw.photo,
        source_ref: raw.source_ref,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_standalone_five_digit_token() {
        assert_eq!(
            extract_set_id("LEGO Star Wars 75402 Republic Fighter").as_deref(),
            Some("75402")
        );
        assert_eq!(extract_set_id("Set 10363 (neuf) ou 42182").as_deref(), Some("10363"));
        assert_eq!(extract_set_id("lego-76262-sealed").as_deref(), Some("76262"));
        assert_eq!(extract_set_id("42635").as_deref(), Some("42635"));
    }

    #[test]
    fn rejects_titles_without_exact_five_digit_run() {
        assert_eq!(extract_set_id("No digits here"), None);
        assert_eq!(extract_set_id("Barcode 5702017583488"), None);
        assert_eq!(extract_set_id("Only 1234 pieces"), None);
        assert_eq!(extract_set_id("ref75402 or 75402x"), None);
        assert_eq!(extract_set_id("id_75402"), None);
    }

    #[test]
    fn skips_embedded_runs_and_finds_later_token() {
        assert_eq!(
            extract_set_id("EAN 123456789 for set 71460").as_deref(),
            Some("71460")
        );
    }

    #[test]
    fn canonicalizes_common_date_shapes() {
        assert_eq!(canonical_date("Tue, 15 Oct 2024 12:34:56 GMT"), "2024-10-15");
        assert_eq!(canonical_date("Tue, 15 Oct 2024 12:34:56 +0000"), "2024-10-15");
        assert_eq!(canonical_date("2024-10-15T23:30:00-02:00"), "2024-10-16");
        assert_eq!(canonical_date("2024-10-15 08:00:00"), "2024-10-15");
        assert_eq!(canonical_date("2024-10-15"), "2024-10-15");
        assert_eq!(canonical_date("Tue, 15 Oct 2024 13:46:40 +0000"), "2024-10-15");
    }

    #[test]
    fn bare_digit_strings_are_not_read_as_timestamps() {
        assert_eq!(canonical_date("2024"), "2024");
        assert_eq!(canonical_date("20241015"), "20241015");
        assert_eq!(canonical_date("0"), "0");
        assert_eq!(canonical_date("1729000000"), "1729000000");
    }

    #[test]
    fn unparseable_dates_pass_through_verbatim() {
        assert_eq!(canonical_date("il y a 3 jours"), "il y a 3 jours");
        assert_eq!(canonical_date(""), "");
    }

    #[test]
    fn discount_is_rounded_percentage_of_retail() {
        assert_eq!(compute_discount(Some(75.0), Some(100.0)), 25);
        assert_eq!(compute_discount(Some(19.99), Some(29.99)), 33);
        assert_eq!(compute_discount(Some(120.0), Some(100.0)), -20);
    }

    #[test]
    fn discount_is_zero_without_usable_retail() {
        assert_eq!(compute_discount(Some(75.0), Some(0.0)), 0);
        assert_eq!(compute_discount(Some(75.0), None), 0);
        assert_eq!(compute_discount(None, Some(100.0)), 0);
    }

    #[test]
    fn identity_depends_only_on_link() {
        let a = listing_identity("https://www.vinted.fr/items/1-lego");
        let b = listing_identity("https://www.vinted.fr/items/1-lego");
        let c = listing_identity("https://www.vinted.fr/items/2-lego");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.get_version_num(), 5);
    }

    #[test]
    fn normalize_drops_records_without_set_id() {
        let raw = RawListing::new("Boite de rangement", "https://example.test/1");
        assert!(normalize_listing(raw).is_none());
    }

    #[test]
    fn normalize_fills_identity_and_canonical_date() {
        let mut raw = RawListing::new(
            "LEGO Star Wars 75402 Republic Fighter",
            "https://www.dealabs.com/bons-plans/lego-75402-1",
        );
        raw.price = Some(39.99);
        raw.published = Some("Tue, 15 Oct 2024 12:34:56 GMT".into());
        raw.source_ref = Some("2890311".into());

        let listing = normalize_listing(raw).expect("set id present");
        assert_eq!(listing.set_id, "75402");
        assert_eq!(listing.published.as_deref(), Some("2024-10-15"));
        assert_eq!(listing.identity, listing_identity(&listing.link));
        assert_eq!(listing.source_ref.as_deref(), Some("2890311"));
    }

    #[test]
    fn absent_fields_serialize_as_null() {
        let raw = RawListing::new("LEGO 10363 Leonardo", "https://example.test/10363");
        let listing = normalize_listing(raw).unwrap();
        let value = serde_json::to_value(&listing).unwrap();
        assert!(value["price"].is_null());
        assert!(value["published"].is_null());
        assert_eq!(value["discount"], 0);
        assert_eq!(value["set_id"], "10363");
    }
}
