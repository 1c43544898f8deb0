// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! USD exchange rate for the `/balance` price table.
//!
//! Quotes are cached on each user account and refreshed at most once per
//! display when older than a day. A failed refresh keeps the cached quote.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use parley_core::types::FxQuote;
use parley_core::{ParleyError, RateSource};
use serde::Deserialize;
use tracing::{debug, warn};

/// Daily rate feed of the Central Bank of Russia, in its JSON mirror format.
#[derive(Debug, Clone)]
pub struct CbrRateSource {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct DailyRates {
    #[serde(rename = "Date")]
    date: DateTime<FixedOffset>,
    #[serde(rename = "Valute")]
    valute: Valute,
}

#[derive(Debug, Deserialize)]
struct Valute {
    #[serde(rename = "USD")]
    usd: Currency,
}

#[derive(Debug, Deserialize)]
struct Currency {
    #[serde(rename = "Value")]
    value: f64,
}

fn rate_error(message: String) -> ParleyError {
    ParleyError::Internal(format!("rate source: {message}"))
}

impl CbrRateSource {
    pub fn new(url: impl Into<String>) -> Result<Self, ParleyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| rate_error(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RateSource for CbrRateSource {
    async fn current_rate(&self) -> Result<FxQuote, ParleyError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| rate_error(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(rate_error(format!("feed returned {status}")));
        }

        let rates: DailyRates = response
            .json()
            .await
            .map_err(|e| rate_error(format!("malformed feed: {e}")))?;

        debug!(rate = rates.valute.usd.value, published = %rates.date, "fetched USD rate");
        // Stamped with the fetch time: the feed is not republished over weekends.
        Ok(FxQuote {
            rate: rates.valute.usd.value,
            as_of: Utc::now(),
        })
    }
}

/// Refreshes cached quotes that have gone stale.
#[derive(Clone)]
pub struct RateRefresher {
    source: Arc<dyn RateSource>,
    fallback_rate: f64,
}

impl RateRefresher {
    pub fn new(source: Arc<dyn RateSource>, fallback_rate: f64) -> Self {
        Self {
            source,
            fallback_rate,
        }
    }

    /// Quote given to new accounts. Already stale, so the first display refreshes it.
    pub fn fallback_quote(&self) -> FxQuote {
        FxQuote {
            rate: self.fallback_rate,
            as_of: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// A fresh quote if `cached` is stale and the source answers, else `None`.
    pub async fn refresh(&self, cached: FxQuote, now: DateTime<Utc>) -> Option<FxQuote> {
        if !cached.is_stale(now) {
            return None;
        }
        match self.source.current_rate().await {
            Ok(quote) => Some(quote),
            Err(e) => {
                warn!(error = %e, cached_rate = cached.rate, "rate refresh failed, keeping cached quote");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"{
        "Date": "2024-01-10T11:30:00+03:00",
        "PreviousDate": "2024-01-09T11:30:00+03:00",
        "Valute": {
            "USD": { "ID": "R01235", "CharCode": "USD", "Nominal": 1, "Value": 89.6688, "Previous": 90.3041 },
            "EUR": { "ID": "R01239", "CharCode": "EUR", "Nominal": 1, "Value": 98.2236, "Previous": 99.1919 }
        }
    }"#;

    async fn feed_server(status: u16, body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/daily_json.js"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn parses_usd_rate_and_stamps_fetch_time() {
        let server = feed_server(200, FEED).await;
        let source = CbrRateSource::new(format!("{}/daily_json.js", server.uri())).unwrap();

        let before = Utc::now();
        let quote = source.current_rate().await.unwrap();
        assert!((quote.rate - 89.6688).abs() < 1e-9);
        assert!(quote.as_of >= before);
        assert!(quote.as_of <= Utc::now());
    }

    #[tokio::test]
    async fn quote_from_an_old_feed_is_cached_for_a_day() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .expect(1)
            .mount(&server)
            .await;
        let source = CbrRateSource::new(format!("{}/daily_json.js", server.uri())).unwrap();
        let refresher = RateRefresher::new(Arc::new(source), 75.0);

        // The feed is dated 2024; a second display right after must not refetch.
        let fresh = refresher
            .refresh(refresher.fallback_quote(), Utc::now())
            .await
            .unwrap();
        assert_eq!(refresher.refresh(fresh, Utc::now()).await, None);
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = feed_server(503, "unavailable").await;
        let source = CbrRateSource::new(format!("{}/daily_json.js", server.uri())).unwrap();
        assert!(source.current_rate().await.is_err());
    }

    #[tokio::test]
    async fn malformed_feed_is_reported() {
        let server = feed_server(200, r#"{"Date": "2024-01-10T11:30:00+03:00"}"#).await;
        let source = CbrRateSource::new(format!("{}/daily_json.js", server.uri())).unwrap();
        assert!(source.current_rate().await.is_err());
    }

    #[tokio::test]
    async fn fresh_quote_is_not_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .expect(0)
            .mount(&server)
            .await;
        let source = CbrRateSource::new(format!("{}/daily_json.js", server.uri())).unwrap();
        let refresher = RateRefresher::new(Arc::new(source), 75.0);

        let now = Utc::now();
        let cached = FxQuote { rate: 90.0, as_of: now };
        assert_eq!(refresher.refresh(cached, now).await, None);
    }

    #[tokio::test]
    async fn stale_fallback_quote_is_refreshed() {
        let server = feed_server(200, FEED).await;
        let source = CbrRateSource::new(format!("{}/daily_json.js", server.uri())).unwrap();
        let refresher = RateRefresher::new(Arc::new(source), 75.0);

        let cached = refresher.fallback_quote();
        assert!((cached.rate - 75.0).abs() < f64::EPSILON);
        let fresh = refresher.refresh(cached, Utc::now()).await.unwrap();
        assert!((fresh.rate - 89.6688).abs() < 1e-9);
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_refresh_keeps_cache_and_warns() {
        let server = feed_server(500, "boom").await;
        let source = CbrRateSource::new(format!("{}/daily_json.js", server.uri())).unwrap();
        let refresher = RateRefresher::new(Arc::new(source), 75.0);

        assert_eq!(refresher.refresh(refresher.fallback_quote(), Utc::now()).await, None);
        assert!(logs_contain("rate refresh failed"));
    }
}
