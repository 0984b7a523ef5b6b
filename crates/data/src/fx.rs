//! Client for the official exchange-rate feed used to enrich rate updates.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use sighub_core::{FeedError, FxFeed};
use std::time::Duration;

pub const DEFAULT_RATES_URL: &str = "https://www.nbrb.by/api/exrates/rates?periodicity=0";

/// Settings for [`OfficialRateFeed`].
#[derive(Debug, Clone)]
pub struct OfficialRateConfig {
    pub url: String,
    /// `Cur_ID` of the entry to extract.
    pub currency_id: i64,
    /// Pair name the rate is published under.
    pub symbol: String,
    pub timeout: Duration,
}

impl Default for OfficialRateConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RATES_URL.to_string(),
            currency_id: 145,
            symbol: "USDBYN".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OfficialRate {
    #[serde(rename = "Cur_ID")]
    currency_id: i64,
    #[serde(rename = "Cur_OfficialRate", default)]
    official_rate: Option<Decimal>,
}

/// Fetches one official rate from a national-bank style JSON endpoint.
pub struct OfficialRateFeed {
    client: reqwest::Client,
    config: OfficialRateConfig,
}

impl OfficialRateFeed {
    pub fn new(config: OfficialRateConfig) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FeedError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl FxFeed for OfficialRateFeed {
    fn symbol(&self) -> &str {
        &self.config.symbol
    }

    async fn fetch_rate(&self) -> Result<Decimal, FeedError> {
        let response = self
            .client
            .get(&self.config.url)
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(map_reqwest)?;
        extract_rate(&body, self.config.currency_id)
    }
}

fn map_reqwest(e: reqwest::Error) -> FeedError {
    if e.is_timeout() {
        FeedError::Timeout
    } else {
        FeedError::Http(e.to_string())
    }
}

/// Pick the official rate of `currency_id` out of the feed body.
///
/// A missing entry yields zero, matching the "no rate" convention.
pub fn extract_rate(body: &str, currency_id: i64) -> Result<Decimal, FeedError> {
    let rates: Vec<OfficialRate> =
        serde_json::from_str(body).map_err(|e| FeedError::Parse(e.to_string()))?;
    Ok(rates
        .into_iter()
        .find(|r| r.currency_id == currency_id)
        .and_then(|r| r.official_rate)
        .unwrap_or(Decimal::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const BODY: &str = r#"[
        {"Cur_ID":431,"Date":"2024-05-02T00:00:00","Cur_Abbreviation":"USD","Cur_OfficialRate":3.2727},
        {"Cur_ID":145,"Date":"2024-05-02T00:00:00","Cur_Abbreviation":"USD","Cur_OfficialRate":3.2688},
        {"Cur_ID":292,"Cur_Abbreviation":"EUR"}
    ]"#;

    #[test]
    fn test_extract_rate_picks_configured_currency() {
        assert_eq!(extract_rate(BODY, 145).unwrap(), dec!(3.2688));
    }

    #[test]
    fn test_extract_rate_missing_entry_is_zero() {
        assert_eq!(extract_rate(BODY, 999).unwrap(), Decimal::ZERO);
        assert_eq!(extract_rate(BODY, 292).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_extract_rate_rejects_garbage() {
        assert!(matches!(extract_rate("<html>", 145), Err(FeedError::Parse(_))));
    }
}
