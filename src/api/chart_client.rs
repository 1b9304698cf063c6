use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::api::PriceHistoryProvider;
use crate::error::{DataError, Result};
use crate::models::{Config, PriceBar};

/// Chart API response envelope.
#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteBlock>,
}

#[derive(Debug, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

/// Client for the daily price-history provider.
pub struct ChartClient {
    client: Client,
    base_url: Url,
}

impl ChartClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent("stockcache/0.1")
            .build()?;
        let base_url = Url::parse(&config.price_base_url)
            .map_err(|e| DataError::Config(format!("invalid price base url: {e}")))?;
        Ok(Self { client, base_url })
    }
}

/// Flatten one chart result into bars. Provider timestamps are epoch
/// seconds; taking the UTC calendar date is the timezone-strip step. Candles
/// with a null OHLC field are dropped.
fn bars_from_chart(result: ChartResult) -> Vec<PriceBar> {
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Vec::new();
    };
    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let Some(date) = DateTime::from_timestamp(*ts, 0).map(|dt| dt.date_naive()) else {
            continue;
        };
        let (Some(open), Some(high), Some(low), Some(close)) = (
            quote.open.get(i).copied().flatten(),
            quote.high.get(i).copied().flatten(),
            quote.low.get(i).copied().flatten(),
            quote.close.get(i).copied().flatten(),
        ) else {
            continue;
        };
        let volume = quote.volume.get(i).copied().flatten().unwrap_or(0);
        bars.push(PriceBar { date, open, high, low, close, volume });
    }
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    bars
}

#[async_trait::async_trait]
impl PriceHistoryProvider for ChartClient {
    async fn price_history(
        &self,
        symbol: &str,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Vec<PriceBar>> {
        let url = self
            .base_url
            .join(&format!("v8/finance/chart/{symbol}"))
            .map_err(|e| DataError::Config(format!("invalid chart url for {symbol}: {e}")))?;

        let mut request = self.client.get(url).query(&[("interval", "1d")]);
        match range {
            Some((start, end)) => {
                let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
                // end of day, inclusive
                let period2 = end.and_time(NaiveTime::MIN).and_utc().timestamp() + 86_399;
                request = request.query(&[
                    ("period1", period1.to_string()),
                    ("period2", period2.to_string()),
                ]);
            }
            None => {
                request = request.query(&[("range", "max")]);
            }
        }

        debug!("requesting chart history for {}", symbol);
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::Malformed(format!(
                "chart request for {symbol} failed with status {status}: {body}"
            )));
        }

        let envelope: ChartEnvelope = response.json().await?;
        if let Some(err) = envelope.chart.error {
            return Err(DataError::Malformed(format!(
                "chart provider error for {symbol}: {err}"
            )));
        }

        let bars = envelope
            .chart
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(bars_from_chart)
            .unwrap_or_default();
        debug!("retrieved {} bars for {}", bars.len(), symbol);
        Ok(bars)
    }
}
