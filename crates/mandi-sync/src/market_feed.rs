//! # Market Feed
//!
//! Reads the remote price list and turns it into typed records.
//!
//! ## Parse, Don't Validate
//! ```text
//! GET {read_url}
//!      │
//!      ▼
//! [ {...}, null, {...}, "x", {...} ]     or     { "data": [ ... ] }
//!      │
//!      ▼
//! parse_feed()
//!      │
//!      ├── prices:    Vec<MarketPrice>        every field checked, typed
//!      └── discarded: Vec<DiscardedEntry>     index + reason, nothing silent
//! ```
//!
//! Any other top-level shape fails the whole fetch with
//! [`SyncError::DeserializationFailed`].

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use mandi_core::validation::{validate_crop_name, validate_district_name, validate_selling_price};
use mandi_core::{Price, ValidationError};
use reqwest::header::ACCEPT;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::{http_client, transport_error};
use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Types
// =============================================================================

/// A price row from the remote feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketPrice {
    /// Remote identifier, when the feed carries an integer one.
    pub id: Option<i64>,
    pub crop_name: String,
    pub district_name: String,
    pub selling_price: Price,
    pub created_at: Option<DateTime<Utc>>,
}

/// Why a feed entry was dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiscardReason {
    #[error("entry is null")]
    Null,

    #[error("entry is not an object")]
    NotAnObject,

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("market_selling_price is not a number: {0}")]
    NonNumericPrice(String),

    #[error("created_at is not a timestamp: {0}")]
    InvalidTimestamp(String),
}

/// A dropped entry and its position in the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscardedEntry {
    pub index: usize,
    pub reason: DiscardReason,
}

/// Result of parsing a feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub prices: Vec<MarketPrice>,
    pub discarded: Vec<DiscardedEntry>,
}

// =============================================================================
// Parsing
// =============================================================================

/// Splits a feed into typed prices and discarded entries.
///
/// ## Example
/// ```rust
/// use mandi_sync::market_feed::parse_feed;
/// use serde_json::json;
///
/// let feed = parse_feed(json!({ "data": [
///     { "crop_name": "Wheat", "district_name": "Pune", "market_selling_price": "2500" },
///     null,
/// ]})).unwrap();
///
/// assert_eq!(feed.prices.len(), 1);
/// assert_eq!(feed.discarded[0].index, 1);
/// ```
pub fn parse_feed(body: Value) -> SyncResult<ParsedFeed> {
    let entries = match body {
        Value::Array(entries) => entries,
        Value::Object(mut object) => match object.remove("data") {
            Some(Value::Array(entries)) => entries,
            _ => {
                return Err(SyncError::DeserializationFailed(
                    "feed object has no \"data\" array".into(),
                ))
            }
        },
        other => {
            return Err(SyncError::DeserializationFailed(format!(
                "feed must be an array or an object, got {}",
                kind_of(&other)
            )))
        }
    };

    let mut feed = ParsedFeed::default();
    for (index, entry) in entries.into_iter().enumerate() {
        match parse_entry(entry) {
            Ok(price) => feed.prices.push(price),
            Err(reason) => feed.discarded.push(DiscardedEntry { index, reason }),
        }
    }

    Ok(feed)
}

fn parse_entry(entry: Value) -> Result<MarketPrice, DiscardReason> {
    let object = match entry {
        Value::Null => return Err(DiscardReason::Null),
        Value::Object(object) => object,
        _ => return Err(DiscardReason::NotAnObject),
    };

    let crop_name = validate_crop_name(text_field(&object, "crop_name"))?;
    let district_name = validate_district_name(text_field(&object, "district_name"))?;
    let selling_price = parse_price(object.get("market_selling_price"))?;
    let created_at = parse_created_at(object.get("created_at"))?;

    Ok(MarketPrice {
        id: object.get("id").and_then(Value::as_i64),
        crop_name,
        district_name,
        selling_price,
        created_at,
    })
}

/// String field, or "" when absent or not a string.
fn text_field<'a>(object: &'a Map<String, Value>, key: &str) -> &'a str {
    object.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn parse_price(value: Option<&Value>) -> Result<Price, DiscardReason> {
    let rupees = match value {
        None | Some(Value::Null) => {
            return Err(ValidationError::Required {
                field: "market_selling_price".to_string(),
            }
            .into())
        }
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| DiscardReason::NonNumericPrice(n.to_string()))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| DiscardReason::NonNumericPrice(s.clone()))?,
        Some(other) => return Err(DiscardReason::NonNumericPrice(other.to_string())),
    };

    Ok(validate_selling_price(rupees)?)
}

fn parse_created_at(value: Option<&Value>) -> Result<Option<DateTime<Utc>>, DiscardReason> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => parse_timestamp(raw)
            .map(Some)
            .ok_or_else(|| DiscardReason::InvalidTimestamp(raw.clone())),
        Some(other) => Err(DiscardReason::InvalidTimestamp(other.to_string())),
    }
}

/// RFC 3339, or SQLite's `YYYY-MM-DD HH:MM:SS` read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|naive| naive.and_utc())
        })
        .ok()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// =============================================================================
// Client
// =============================================================================

/// Fetches the market price feed from the read endpoint.
#[derive(Debug, Clone)]
pub struct MarketFeedClient {
    http: reqwest::Client,
    read_url: Url,
    timeout: Duration,
}

impl MarketFeedClient {
    pub fn new(settings: &RemoteSettings) -> SyncResult<Self> {
        Self::with_timeout(settings, settings.request_timeout())
    }

    pub fn with_timeout(settings: &RemoteSettings, timeout: Duration) -> SyncResult<Self> {
        Ok(MarketFeedClient {
            http: http_client(timeout)?,
            read_url: Url::parse(&settings.read_url)?,
            timeout,
        })
    }

    /// `GET read_url`, then [`parse_feed`].
    pub async fn fetch(&self) -> SyncResult<ParsedFeed> {
        debug!(url = %self.read_url, "Fetching market feed");

        let response = self
            .http
            .get(self.read_url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::RemoteRejected {
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SyncError::DeserializationFailed(e.to_string()))?;
        let feed = parse_feed(body)?;

        for entry in &feed.discarded {
            debug!(index = entry.index, reason = %entry.reason, "Discarded feed entry");
        }
        if !feed.discarded.is_empty() {
            warn!(discarded = feed.discarded.len(), "Market feed had invalid entries");
        }
        info!(prices = feed.prices.len(), "Market feed fetched");

        Ok(feed)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_keeps_good_rows_and_discards_bad_ones() {
        let feed = parse_feed(json!([
            {
                "id": 7,
                "crop_name": " Wheat ",
                "district_name": "Pune",
                "market_selling_price": 2500.5,
                "created_at": "2024-05-01T10:00:00.000Z"
            },
            null,
            "Onion",
            { "crop_name": "", "district_name": "Pune", "market_selling_price": 10 },
            { "crop_name": "Rice", "market_selling_price": 10 },
            { "crop_name": "Rice", "district_name": "Pune", "market_selling_price": "cheap" },
            { "crop_name": "Rice", "district_name": "Pune", "market_selling_price": -3 },
            { "crop_name": "Rice", "district_name": "Pune" },
            { "crop_name": "Rice", "district_name": "Pune", "market_selling_price": 10, "created_at": "soon" },
            { "crop_name": "Maize", "district_name": "Latur", "market_selling_price": " 1900 " }
        ]))
        .unwrap();

        assert_eq!(feed.prices.len(), 2);
        assert_eq!(
            feed.prices[0],
            MarketPrice {
                id: Some(7),
                crop_name: "Wheat".to_string(),
                district_name: "Pune".to_string(),
                selling_price: Price::from_paise(250_050),
                created_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()),
            }
        );
        assert_eq!(feed.prices[1].selling_price, Price::from_paise(190_000));
        assert_eq!(feed.prices[1].created_at, None);

        let indexes: Vec<usize> = feed.discarded.iter().map(|d| d.index).collect();
        assert_eq!(indexes, vec![1, 2, 3, 4, 5, 6, 7, 8]);

        let reasons: Vec<&DiscardReason> = feed.discarded.iter().map(|d| &d.reason).collect();
        assert_eq!(reasons[0], &DiscardReason::Null);
        assert_eq!(reasons[1], &DiscardReason::NotAnObject);
        assert!(matches!(
            reasons[2],
            DiscardReason::Invalid(ValidationError::Required { field }) if field == "crop_name"
        ));
        assert!(matches!(
            reasons[3],
            DiscardReason::Invalid(ValidationError::Required { field }) if field == "district_name"
        ));
        assert_eq!(reasons[4], &DiscardReason::NonNumericPrice("cheap".to_string()));
        assert!(matches!(
            reasons[5],
            DiscardReason::Invalid(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            reasons[6],
            DiscardReason::Invalid(ValidationError::Required { field }) if field == "market_selling_price"
        ));
        assert_eq!(reasons[7], &DiscardReason::InvalidTimestamp("soon".to_string()));
    }

    #[test]
    fn test_accepts_data_wrapper_and_rejects_other_shapes() {
        let feed = parse_feed(json!({ "data": [] })).unwrap();
        assert_eq!(feed, ParsedFeed::default());

        assert!(matches!(
            parse_feed(json!({ "rows": [] })),
            Err(SyncError::DeserializationFailed(_))
        ));
        assert!(matches!(
            parse_feed(json!("prices")),
            Err(SyncError::DeserializationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_reads_endpoint() {
        let router = Router::new()
            .route(
                "/market_prices",
                get(|| async {
                    Json(json!({ "data": [
                        { "crop_name": "Tur", "district_name": "Latur", "market_selling_price": 7000 },
                        { "crop_name": "Tur" }
                    ]}))
                }),
            )
            .route("/broken", get(|| async { StatusCode::BAD_GATEWAY }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let settings = RemoteSettings {
            read_url: format!("http://{addr}/market_prices"),
            ..Default::default()
        };
        let feed = MarketFeedClient::new(&settings).unwrap().fetch().await.unwrap();
        assert_eq!(feed.prices.len(), 1);
        assert_eq!(feed.prices[0].crop_name, "Tur");
        assert_eq!(feed.discarded.len(), 1);

        let broken = RemoteSettings {
            read_url: format!("http://{addr}/broken"),
            ..Default::default()
        };
        let err = MarketFeedClient::new(&broken).unwrap().fetch().await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteRejected { status: 502 }));
    }
}
