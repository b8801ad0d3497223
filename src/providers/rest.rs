// =============================================================================
// REST candle client — bearer-authenticated candle endpoint
// =============================================================================
//
// Fetches candle windows from an OANDA-style REST endpoint:
//
//   GET {base}/v3/instruments/{instrument}/candles
//       ?granularity={M5|M15|H1}&count={n}&price=M
//
// Midpoint pricing; incomplete candles are passed through and filtered by
// the series layer. The API token is sent as a header and never logged.
// The HTTP client carries a construction-time timeout; the fetch layer
// wraps calls in a second, explicit timeout with skip-cycle semantics.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, instrument};

use crate::market_data::{Candle, Timeframe};
use crate::providers::MarketDataProvider;

/// Request timeout baked into the HTTP client.
const HTTP_TIMEOUT_SECS: u64 = 10;

/// REST client for the candle endpoint.
#[derive(Clone)]
pub struct CandleRestClient {
    base_url: String,
    client: reqwest::Client,
}

impl CandleRestClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` — e.g. `https://api-fxpractice.oanda.com`.
    /// * `api_token` — bearer token, sent as a default header.
    pub fn new(base_url: impl Into<String>, api_token: &str) -> Self {
        let mut default_headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_token}")) {
            default_headers.insert("Authorization", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .expect("failed to build reqwest client");

        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

#[async_trait]
impl MarketDataProvider for CandleRestClient {
    #[instrument(skip(self), name = "candles::fetch")]
    async fn fetch(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/v3/instruments/{}/candles?granularity={}&count={}&price=M",
            self.base_url,
            instrument,
            timeframe.granularity(),
            count
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("candle request failed for {instrument}@{timeframe}"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("invalid candle response body for {instrument}@{timeframe}"))?;

        if !status.is_success() {
            bail!("candle endpoint returned {status} for {instrument}@{timeframe}: {body}");
        }

        let candles = parse_candles(&body)?;
        debug!(
            instrument,
            timeframe = %timeframe,
            count = candles.len(),
            "candles fetched"
        );
        Ok(candles)
    }
}

/// Parse the provider's candle payload.
///
/// Expected shape:
/// ```json
/// { "candles": [
///     { "complete": true, "time": "2026-08-07T12:00:00.000000000Z",
///       "volume": 1234,
///       "mid": { "o": "1.26500", "h": "1.26560", "l": "1.26480", "c": "1.26543" } }
/// ] }
/// ```
fn parse_candles(body: &serde_json::Value) -> Result<Vec<Candle>> {
    let raw = body["candles"]
        .as_array()
        .context("missing candles array in response")?;

    let mut candles = Vec::with_capacity(raw.len());
    for item in raw {
        let complete = item["complete"].as_bool().unwrap_or(false);

        let time = item["time"].as_str().context("missing candle time")?;
        let open_time = DateTime::parse_from_rfc3339(time)
            .with_context(|| format!("unparseable candle time: {time}"))?
            .timestamp_millis();

        let mid = &item["mid"];
        let volume = item["volume"].as_f64().unwrap_or(0.0);

        candles.push(Candle {
            open_time,
            open: parse_price(&mid["o"], "mid.o")?,
            high: parse_price(&mid["h"], "mid.h")?,
            low: parse_price(&mid["l"], "mid.l")?,
            close: parse_price(&mid["c"], "mid.c")?,
            volume,
            complete,
        });
    }

    Ok(candles)
}

/// The provider sends prices as JSON strings; tolerate plain numbers too.
fn parse_price(value: &serde_json::Value, name: &str) -> Result<f64> {
    match value {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}")),
        serde_json::Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64")),
        _ => bail!("field {name} has unexpected JSON type"),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_candles_ok() {
        let body: serde_json::Value = serde_json::from_str(
            r#"{
                "instrument": "GBP_USD",
                "granularity": "M5",
                "candles": [
                    {
                        "complete": true,
                        "volume": 321,
                        "time": "2026-08-07T12:00:00.000000000Z",
                        "mid": { "o": "1.26500", "h": "1.26560", "l": "1.26480", "c": "1.26543" }
                    },
                    {
                        "complete": false,
                        "volume": 18,
                        "time": "2026-08-07T12:05:00.000000000Z",
                        "mid": { "o": "1.26543", "h": "1.26550", "l": "1.26530", "c": "1.26540" }
                    }
                ]
            }"#,
        )
        .unwrap();

        let candles = parse_candles(&body).unwrap();
        assert_eq!(candles.len(), 2);
        assert!(candles[0].complete);
        assert!(!candles[1].complete);
        assert!((candles[0].close - 1.26543).abs() < 1e-12);
        assert!((candles[0].volume - 321.0).abs() < f64::EPSILON);
        assert!(candles[0].open_time < candles[1].open_time);
    }

    #[test]
    fn parse_candles_missing_array() {
        let body = serde_json::json!({ "errorMessage": "Invalid instrument" });
        assert!(parse_candles(&body).is_err());
    }

    #[test]
    fn parse_candles_bad_time() {
        let body = serde_json::json!({
            "candles": [
                { "complete": true, "volume": 1, "time": "not-a-time",
                  "mid": { "o": "1", "h": "1", "l": "1", "c": "1" } }
            ]
        });
        assert!(parse_candles(&body).is_err());
    }

    #[test]
    fn parse_price_accepts_string_and_number() {
        assert!((parse_price(&serde_json::json!("1.25"), "x").unwrap() - 1.25).abs() < 1e-12);
        assert!((parse_price(&serde_json::json!(1.25), "x").unwrap() - 1.25).abs() < 1e-12);
        assert!(parse_price(&serde_json::json!(null), "x").is_err());
        assert!(parse_price(&serde_json::json!("abc"), "x").is_err());
    }
}
